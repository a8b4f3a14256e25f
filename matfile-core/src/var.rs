// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-memory variable tree.
//!
//! [MatVar] is the node type both codecs produce and consume: a
//! common header (name, class, data type, dims, flags) plus a
//! payload tagged by class. Cell and struct payloads own child
//! nodes, so a variable is a tree; parsers always produce fully
//! owned trees with no sharing.

use crate::error::{MatError, Result};
use crate::sparse::SparseData;
use matfile_types::{ClassKind, DataKind};

/// A dense buffer of numeric elements, typed by the owning class.
#[derive(Clone, Debug, PartialEq)]
pub enum NumericBuffer {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_buffer {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            NumericBuffer::I8($inner) => $body,
            NumericBuffer::U8($inner) => $body,
            NumericBuffer::I16($inner) => $body,
            NumericBuffer::U16($inner) => $body,
            NumericBuffer::I32($inner) => $body,
            NumericBuffer::U32($inner) => $body,
            NumericBuffer::I64($inner) => $body,
            NumericBuffer::U64($inner) => $body,
            NumericBuffer::F32($inner) => $body,
            NumericBuffer::F64($inner) => $body,
        }
    };
}

impl NumericBuffer {
    pub fn len(&self) -> usize {
        each_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The on-disk data type matching the element type.
    pub fn data_kind(&self) -> DataKind {
        match self {
            Self::I8(_) => DataKind::Int8,
            Self::U8(_) => DataKind::UInt8,
            Self::I16(_) => DataKind::Int16,
            Self::U16(_) => DataKind::UInt16,
            Self::I32(_) => DataKind::Int32,
            Self::U32(_) => DataKind::UInt32,
            Self::I64(_) => DataKind::Int64,
            Self::U64(_) => DataKind::UInt64,
            Self::F32(_) => DataKind::Single,
            Self::F64(_) => DataKind::Double,
        }
    }

    /// The numeric array class matching the element type.
    pub fn class_kind(&self) -> ClassKind {
        match self {
            Self::I8(_) => ClassKind::Int8,
            Self::U8(_) => ClassKind::UInt8,
            Self::I16(_) => ClassKind::Int16,
            Self::U16(_) => ClassKind::UInt16,
            Self::I32(_) => ClassKind::Int32,
            Self::U32(_) => ClassKind::UInt32,
            Self::I64(_) => ClassKind::Int64,
            Self::U64(_) => ClassKind::UInt64,
            Self::F32(_) => ClassKind::Single,
            Self::F64(_) => ClassKind::Double,
        }
    }

    /// Copies out the elements at `indices`, in order, preserving
    /// the element type.
    pub(crate) fn gather(&self, indices: &[usize]) -> Self {
        macro_rules! arm {
            ($variant:ident, $v:ident) => {
                Self::$variant(indices.iter().map(|&i| $v[i]).collect())
            };
        }
        match self {
            Self::I8(v) => arm!(I8, v),
            Self::U8(v) => arm!(U8, v),
            Self::I16(v) => arm!(I16, v),
            Self::U16(v) => arm!(U16, v),
            Self::I32(v) => arm!(I32, v),
            Self::U32(v) => arm!(U32, v),
            Self::I64(v) => arm!(I64, v),
            Self::U64(v) => arm!(U64, v),
            Self::F32(v) => arm!(F32, v),
            Self::F64(v) => arm!(F64, v),
        }
    }

    /// Narrows or widens every element to i32 with saturating float
    /// casts, the conversion the host boundary uses for the integer
    /// classes.
    pub fn to_i32(&self) -> Vec<i32> {
        macro_rules! arm {
            ($v:ident) => {
                $v.iter().map(|&x| x as i32).collect()
            };
        }
        match self {
            Self::I8(v) => arm!(v),
            Self::U8(v) => arm!(v),
            Self::I16(v) => arm!(v),
            Self::U16(v) => arm!(v),
            Self::I32(v) => v.clone(),
            Self::U32(v) => arm!(v),
            Self::I64(v) => arm!(v),
            Self::U64(v) => arm!(v),
            Self::F32(v) => arm!(v),
            Self::F64(v) => arm!(v),
        }
    }

    /// Widens every element to f64.
    pub fn to_f64(&self) -> Vec<f64> {
        macro_rules! arm {
            ($v:ident) => {
                $v.iter().map(|&x| x as f64).collect()
            };
        }
        match self {
            Self::I8(v) => arm!(v),
            Self::U8(v) => arm!(v),
            Self::I16(v) => arm!(v),
            Self::U16(v) => arm!(v),
            Self::I32(v) => arm!(v),
            Self::U32(v) => arm!(v),
            Self::I64(v) => arm!(v),
            Self::U64(v) => arm!(v),
            Self::F32(v) => arm!(v),
            Self::F64(v) => v.clone(),
        }
    }
}

/// A dense numeric payload: real part plus an optional imaginary
/// part of the same type and length.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericData {
    pub re: NumericBuffer,
    pub im: Option<NumericBuffer>,
}

impl NumericData {
    pub fn real(re: NumericBuffer) -> Self {
        Self { re, im: None }
    }

    pub fn complex(re: NumericBuffer, im: NumericBuffer) -> Self {
        Self { re, im: Some(im) }
    }

    pub fn len(&self) -> usize {
        self.re.len()
    }

    pub fn is_empty(&self) -> bool {
        self.re.is_empty()
    }

    pub fn is_complex(&self) -> bool {
        self.im.is_some()
    }
}

/// Character payload, stored in the code units read from or destined
/// for disk, column-major like every other array.
#[derive(Clone, Debug, PartialEq)]
pub enum CharData {
    Utf8(Vec<u8>),
    Utf16(Vec<u16>),
    Utf32(Vec<u32>),
}

impl CharData {
    /// Number of code units.
    pub fn len(&self) -> usize {
        match self {
            Self::Utf8(v) => v.len(),
            Self::Utf16(v) => v.len(),
            Self::Utf32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_kind(&self) -> DataKind {
        match self {
            Self::Utf8(_) => DataKind::Utf8,
            Self::Utf16(_) => DataKind::Utf16,
            Self::Utf32(_) => DataKind::Utf32,
        }
    }
}

/// Struct payload: ordered field names plus a fields-fastest table
/// of children (`index = element * nfields + field`).
#[derive(Clone, Debug, PartialEq)]
pub struct StructData {
    pub fields: Vec<String>,
    pub children: Vec<MatVar>,
}

/// Payload variants, tagged by the owning node's class.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Header read without data (see `MatReader::read_data`).
    None,
    Numeric(NumericData),
    Char(CharData),
    Sparse(SparseData),
    Cell(Vec<MatVar>),
    Struct(StructData),
}

/// One MAT variable or nested array.
#[derive(Clone, Debug, PartialEq)]
pub struct MatVar {
    pub(crate) name: String,
    pub(crate) class: ClassKind,
    pub(crate) data_type: DataKind,
    pub(crate) dims: Vec<usize>,
    pub(crate) complex: bool,
    pub(crate) logical: bool,
    pub(crate) global: bool,
    pub(crate) payload: Payload,
    /// Absolute offset of this variable's element in the source
    /// stream, recorded by info-only reads so the payload can be
    /// loaded later.
    pub(crate) data_offset: Option<u64>,
}

/// Product of a dimension list, guarding against overflow.
pub(crate) fn dim_product(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| MatError::invalid("dimension product overflows"))
}

impl MatVar {
    fn base(name: impl Into<String>, class: ClassKind, dims: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            class,
            data_type: class.default_data_type(),
            dims,
            complex: false,
            logical: false,
            global: false,
            payload: Payload::None,
            data_offset: None,
        }
    }

    /// An empty double array, the placeholder for unset struct
    /// fields and cell slots.
    pub fn empty() -> Self {
        let mut var = Self::base("", ClassKind::Double, vec![0, 0]);
        var.payload = Payload::Numeric(NumericData::real(NumericBuffer::F64(Vec::new())));
        var
    }

    /// A dense numeric array. The class is taken from the buffer's
    /// element type; an imaginary part must match the real part in
    /// type and length.
    pub fn numeric(name: impl Into<String>, dims: Vec<usize>, data: NumericData) -> Result<Self> {
        if dim_product(&dims)? != data.len() {
            return Err(MatError::invalid("dims do not match numeric data length"));
        }
        if let Some(im) = &data.im {
            if im.data_kind() != data.re.data_kind() || im.len() != data.re.len() {
                return Err(MatError::invalid(
                    "imaginary part does not match real part in type and length",
                ));
            }
        }
        let mut var = Self::base(name, data.re.class_kind(), dims);
        var.complex = data.is_complex();
        var.payload = Payload::Numeric(data);
        Ok(var)
    }

    /// A logical array: uint8 storage with the logical flag set.
    pub fn logical(name: impl Into<String>, dims: Vec<usize>, data: Vec<bool>) -> Result<Self> {
        let bytes = data.into_iter().map(u8::from).collect();
        let mut var = Self::numeric(name, dims, NumericData::real(NumericBuffer::U8(bytes)))?;
        var.logical = true;
        Ok(var)
    }

    /// A character array from raw code units.
    pub fn character(name: impl Into<String>, dims: Vec<usize>, data: CharData) -> Result<Self> {
        if dim_product(&dims)? != data.len() {
            return Err(MatError::invalid("dims do not match char data length"));
        }
        let mut var = Self::base(name, ClassKind::Char, dims);
        var.data_type = data.data_kind();
        var.payload = Payload::Char(data);
        Ok(var)
    }

    /// A `1 x n` character row from a string.
    pub fn string(name: impl Into<String>, text: &str) -> Self {
        let units: Vec<u16> = text.encode_utf16().collect();
        let mut var = Self::base(name, ClassKind::Char, vec![1, units.len()]);
        var.data_type = DataKind::Utf16;
        var.payload = Payload::Char(CharData::Utf16(units));
        var
    }

    /// A sparse matrix. `dims` must be `[nrows, ncols]` and the
    /// payload must satisfy the compressed-column invariants.
    pub fn sparse(name: impl Into<String>, dims: Vec<usize>, data: SparseData) -> Result<Self> {
        data.validate(&dims)?;
        let mut var = Self::base(name, ClassKind::Sparse, dims);
        var.complex = data.values.is_complex();
        var.logical = data.values.is_logical();
        var.data_type = if var.logical {
            DataKind::UInt8
        } else {
            DataKind::Double
        };
        var.payload = Payload::Sparse(data);
        Ok(var)
    }

    /// A cell array with every slot initialized to an empty array.
    pub fn cell(name: impl Into<String>, dims: Vec<usize>) -> Result<Self> {
        let n = dim_product(&dims)?;
        let mut var = Self::base(name, ClassKind::Cell, dims);
        var.payload = Payload::Cell(vec![Self::empty(); n]);
        Ok(var)
    }

    /// A struct array with every field of every element initialized
    /// to an empty array. Field names must be unique.
    pub fn structure(
        name: impl Into<String>,
        fields: Vec<String>,
        dims: Vec<usize>,
    ) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].contains(field) {
                return Err(MatError::invalid(format!(
                    "duplicate struct field name {field:?}"
                )));
            }
        }
        let n = dim_product(&dims)?.checked_mul(fields.len()).ok_or_else(|| {
            MatError::invalid("struct child count overflows")
        })?;
        let mut var = Self::base(name, ClassKind::Struct, dims);
        var.payload = Payload::Struct(StructData {
            fields,
            children: vec![Self::empty(); n],
        });
        Ok(var)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn class(&self) -> ClassKind {
        self.class
    }

    pub fn data_type(&self) -> DataKind {
        self.data_type
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of elements (product of dims).
    pub fn len(&self) -> usize {
        dim_product(&self.dims).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        self.complex
    }

    pub fn is_logical(&self) -> bool {
        self.logical
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn set_global(&mut self, global: bool) {
        self.global = global;
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Whether the payload has been loaded.
    pub fn has_data(&self) -> bool {
        !matches!(self.payload, Payload::None)
    }

    /// Struct field names, empty for other classes.
    pub fn fields(&self) -> &[String] {
        match &self.payload {
            Payload::Struct(s) => &s.fields,
            _ => &[],
        }
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields().iter().position(|f| f == field)
    }

    /// Child at a cell's column-major linear index.
    pub fn cell_at(&self, index: usize) -> Option<&MatVar> {
        match &self.payload {
            Payload::Cell(children) => children.get(index),
            _ => None,
        }
    }

    /// Child for `field` of the struct element at column-major
    /// linear index `element`.
    pub fn field_at(&self, field: usize, element: usize) -> Option<&MatVar> {
        match &self.payload {
            Payload::Struct(s) => children_index(s.fields.len(), field, element)
                .and_then(|i| s.children.get(i)),
            _ => None,
        }
    }

    /// Installs `child` at a cell slot, dropping the prior occupant.
    pub fn set_cell(&mut self, index: usize, child: MatVar) -> Result<()> {
        match &mut self.payload {
            Payload::Cell(children) => match children.get_mut(index) {
                Some(slot) => {
                    *slot = child;
                    Ok(())
                }
                None => Err(MatError::invalid(format!("cell index {index} out of range"))),
            },
            _ => Err(MatError::invalid("set_cell on a non-cell variable")),
        }
    }

    /// Installs `child` for `field` of struct element `element`,
    /// dropping the prior occupant.
    pub fn set_field(&mut self, field: usize, element: usize, child: MatVar) -> Result<()> {
        match &mut self.payload {
            Payload::Struct(s) => {
                let index = children_index(s.fields.len(), field, element)
                    .filter(|&i| i < s.children.len())
                    .ok_or_else(|| {
                        MatError::invalid(format!(
                            "struct slot (field {field}, element {element}) out of range"
                        ))
                    })?;
                s.children[index] = child;
                Ok(())
            }
            _ => Err(MatError::invalid("set_field on a non-struct variable")),
        }
    }

    /// Checks the header invariants a node must satisfy before it
    /// can be serialized.
    pub(crate) fn validate_for_write(&self) -> Result<()> {
        if self.dims.is_empty() {
            return Err(MatError::invalid("variable has rank 0"));
        }
        if !self.class.compatible_with(self.data_type) {
            return Err(MatError::invalid(format!(
                "class {:?} is incompatible with data type {:?}",
                self.class, self.data_type
            )));
        }
        let n = dim_product(&self.dims)?;
        match &self.payload {
            Payload::None => Err(MatError::invalid("variable data has not been read")),
            Payload::Numeric(data) => {
                if data.len() != n {
                    return Err(MatError::invalid("numeric payload length mismatch"));
                }
                Ok(())
            }
            Payload::Char(data) => {
                if data.len() != n {
                    return Err(MatError::invalid("char payload length mismatch"));
                }
                Ok(())
            }
            Payload::Sparse(data) => data.validate(&self.dims),
            Payload::Cell(children) => {
                if children.len() != n {
                    return Err(MatError::invalid("cell child count mismatch"));
                }
                children.iter().try_for_each(Self::validate_for_write)
            }
            Payload::Struct(s) => {
                if s.children.len() != s.fields.len() * n {
                    return Err(MatError::invalid("struct child count mismatch"));
                }
                s.children.iter().try_for_each(Self::validate_for_write)
            }
        }
    }
}

fn children_index(nfields: usize, field: usize, element: usize) -> Option<usize> {
    if field >= nfields {
        return None;
    }
    element.checked_mul(nfields)?.checked_add(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_shape_is_checked() {
        let data = NumericData::real(NumericBuffer::I32(vec![1, 2, 3, 4, 5, 6]));
        let var = MatVar::numeric("a", vec![2, 3], data.clone()).unwrap();
        assert_eq!(var.class(), ClassKind::Int32);
        assert_eq!(var.data_type(), DataKind::Int32);
        assert_eq!(var.rank(), 2);
        assert!(MatVar::numeric("a", vec![2, 2], data).is_err());
    }

    #[test]
    fn complex_parts_must_match() {
        let data = NumericData::complex(
            NumericBuffer::F64(vec![1.0, 2.0]),
            NumericBuffer::F32(vec![3.0, 4.0]),
        );
        assert!(MatVar::numeric("z", vec![1, 2], data).is_err());
        let data = NumericData::complex(
            NumericBuffer::F64(vec![1.0, 2.0]),
            NumericBuffer::F64(vec![3.0]),
        );
        assert!(MatVar::numeric("z", vec![1, 2], data).is_err());
    }

    #[test]
    fn string_dims_follow_utf16_units() {
        let var = MatVar::string("s", "abc");
        assert_eq!(var.dims(), &[1, 3]);
        assert_eq!(var.data_type(), DataKind::Utf16);
        assert!(var.class().compatible_with(var.data_type()));
    }

    #[test]
    fn logical_sets_flag_and_bytes() {
        let var = MatVar::logical("b", vec![1, 3], vec![true, false, true]).unwrap();
        assert!(var.is_logical());
        assert_eq!(var.class(), ClassKind::UInt8);
        match var.payload() {
            Payload::Numeric(data) => assert_eq!(data.re, NumericBuffer::U8(vec![1, 0, 1])),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn struct_field_table_layout() {
        let mut var =
            MatVar::structure("s", vec!["a".into(), "b".into()], vec![2, 1]).unwrap();
        var.set_field(1, 1, MatVar::string("", "x")).unwrap();
        assert_eq!(var.field_at(1, 1).unwrap().class(), ClassKind::Char);
        assert_eq!(var.field_at(0, 0).unwrap().class(), ClassKind::Double);
        assert!(var.set_field(2, 0, MatVar::empty()).is_err());
        assert!(var.set_field(0, 2, MatVar::empty()).is_err());
    }

    #[test]
    fn duplicate_fields_rejected() {
        assert!(MatVar::structure("s", vec!["a".into(), "a".into()], vec![1, 1]).is_err());
    }

    #[test]
    fn cell_slots() {
        let mut var = MatVar::cell("c", vec![2, 1]).unwrap();
        var.set_cell(0, MatVar::string("", "hi")).unwrap();
        assert_eq!(var.cell_at(0).unwrap().class(), ClassKind::Char);
        assert!(var.set_cell(2, MatVar::empty()).is_err());
    }

    #[test]
    fn gather_preserves_type() {
        let buf = NumericBuffer::I16(vec![10, 20, 30, 40]);
        assert_eq!(buf.gather(&[3, 0]), NumericBuffer::I16(vec![40, 10]));
    }

    #[test]
    fn validate_for_write_catches_unloaded() {
        let mut var = MatVar::empty();
        var.payload = Payload::None;
        assert!(var.validate_for_write().is_err());
        assert!(MatVar::empty().validate_for_write().is_ok());
    }
}
