// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The host-value bridge.
//!
//! [HostValue] models the dynamically typed tree a binding layer
//! supplies and receives: vectors with an optional dimension
//! attribute, strings, sparse matrices, and lists that are named
//! (struct) or unnamed (cell). [to_matvar] and [to_host] translate
//! between that tree and [MatVar], inferring struct-array and cell
//! shapes and refusing with `ShapeMismatch` where no MAT shape
//! exists (mixed field lengths, named and unnamed items together).

use crate::diag::Diagnostics;
use crate::error::{MatError, Result};
use crate::sparse::{SparseData, SparseValues};
use crate::var::{CharData, MatVar, NumericBuffer, NumericData, Payload};
use matfile_types::ClassKind;

/// Stored values of a host-side sparse matrix.
#[derive(Clone, Debug, PartialEq)]
pub enum HostSparse {
    Real(Vec<f64>),
    Logical(Vec<bool>),
}

/// A dynamically typed host value.
///
/// `dim` attributes are column-major shapes; a vector without one is
/// treated as `1 x len`.
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    Null,
    Real64 {
        data: Vec<f64>,
        dim: Option<Vec<usize>>,
    },
    Int32 {
        data: Vec<i32>,
        dim: Option<Vec<usize>>,
    },
    Complex128 {
        re: Vec<f64>,
        im: Vec<f64>,
        dim: Option<Vec<usize>>,
    },
    Bool {
        data: Vec<bool>,
        dim: Option<Vec<usize>>,
    },
    Str(String),
    StringArray(Vec<String>),
    List {
        items: Vec<HostValue>,
        names: Option<Vec<String>>,
    },
    Sparse {
        dims: [usize; 2],
        ir: Vec<i32>,
        jc: Vec<i32>,
        values: HostSparse,
    },
}

impl HostValue {
    pub fn real(data: Vec<f64>) -> Self {
        Self::Real64 { data, dim: None }
    }

    pub fn int(data: Vec<i32>) -> Self {
        Self::Int32 { data, dim: None }
    }

    pub fn logical(data: Vec<bool>) -> Self {
        Self::Bool { data, dim: None }
    }

    pub fn scalar(value: f64) -> Self {
        Self::real(vec![value])
    }

    /// An unnamed list (maps to a cell array).
    pub fn list(items: Vec<HostValue>) -> Self {
        Self::List { items, names: None }
    }

    /// A named list (maps to a struct).
    pub fn record(names: Vec<&str>, items: Vec<HostValue>) -> Self {
        Self::List {
            items,
            names: Some(names.into_iter().map(String::from).collect()),
        }
    }

    /// Item length used for struct and cell shape inference.
    fn inference_len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Real64 { data, .. } => data.len(),
            Self::Int32 { data, .. } => data.len(),
            Self::Complex128 { re, .. } => re.len(),
            Self::Bool { data, .. } => data.len(),
            Self::Str(_) => 1,
            Self::StringArray(v) => v.len(),
            Self::List { items, .. } => items.len(),
            Self::Sparse { .. } => 1,
        }
    }
}

/// Shape for a vector value: the dim attribute when present, else a
/// `1 x len` row.
fn shape_of(dim: &Option<Vec<usize>>, len: usize) -> Result<Vec<usize>> {
    match dim {
        Some(dims) => {
            if dims.is_empty() {
                return Err(MatError::shape("empty dim attribute"));
            }
            let product: usize = dims.iter().product();
            if product != len {
                return Err(MatError::shape(format!(
                    "dim attribute {dims:?} does not match {len} elements"
                )));
            }
            Ok(dims.clone())
        }
        None => Ok(vec![1, len]),
    }
}

/// Maps a host value to a variable named `name`.
pub fn to_matvar(name: &str, value: &HostValue) -> Result<MatVar> {
    match value {
        HostValue::Null => MatVar::numeric(
            name,
            vec![0, 1],
            NumericData::real(NumericBuffer::F64(Vec::new())),
        ),
        HostValue::Real64 { data, dim } => MatVar::numeric(
            name,
            shape_of(dim, data.len())?,
            NumericData::real(NumericBuffer::F64(data.clone())),
        ),
        HostValue::Int32 { data, dim } => MatVar::numeric(
            name,
            shape_of(dim, data.len())?,
            NumericData::real(NumericBuffer::I32(data.clone())),
        ),
        HostValue::Complex128 { re, im, dim } => {
            if re.len() != im.len() {
                return Err(MatError::shape("complex parts differ in length"));
            }
            MatVar::numeric(
                name,
                shape_of(dim, re.len())?,
                NumericData::complex(
                    NumericBuffer::F64(re.clone()),
                    NumericBuffer::F64(im.clone()),
                ),
            )
        }
        HostValue::Bool { data, dim } => {
            MatVar::logical(name, shape_of(dim, data.len())?, data.clone())
        }
        HostValue::Str(text) => Ok(MatVar::string(name, text)),
        HostValue::StringArray(strings) => string_array_to_matvar(name, strings),
        HostValue::Sparse {
            dims,
            ir,
            jc,
            values,
        } => {
            let values = match values {
                HostSparse::Real(v) => SparseValues::Real(v.clone()),
                HostSparse::Logical(v) => SparseValues::Logical(v.clone()),
            };
            MatVar::sparse(
                name,
                vec![dims[0], dims[1]],
                SparseData {
                    nzmax: ir.len().max(values.len()),
                    ir: ir.clone(),
                    jc: jc.clone(),
                    values,
                },
            )
        }
        HostValue::List { items, names } => match names {
            Some(names) => struct_from_list(name, items, names),
            None => cell_from_list(name, items),
        },
    }
}

/// Equal-length strings pack into one char matrix, a row per
/// string; ragged lengths fall back to a cell of char rows.
fn string_array_to_matvar(name: &str, strings: &[String]) -> Result<MatVar> {
    let units: Vec<Vec<u16>> = strings.iter().map(|s| s.encode_utf16().collect()).collect();
    let n = strings.len();
    if n == 0 {
        return MatVar::character(name, vec![0, 0], CharData::Utf16(Vec::new()));
    }
    let len = units[0].len();
    if units.iter().all(|u| u.len() == len) {
        let mut packed = vec![0u16; n * len];
        for (i, row) in units.iter().enumerate() {
            for (j, &unit) in row.iter().enumerate() {
                packed[j * n + i] = unit;
            }
        }
        MatVar::character(name, vec![n, len], CharData::Utf16(packed))
    } else {
        let mut cell = MatVar::cell(name, vec![n, 1])?;
        for (i, s) in strings.iter().enumerate() {
            cell.set_cell(i, MatVar::string("", s))?;
        }
        Ok(cell)
    }
}

/// The element at `index` of a list item, as a nested variable.
fn slice_item(item: &HostValue, index: usize) -> Result<MatVar> {
    match item {
        HostValue::Real64 { data, .. } => MatVar::numeric(
            "",
            vec![1, 1],
            NumericData::real(NumericBuffer::F64(vec![data[index]])),
        ),
        HostValue::Int32 { data, .. } => MatVar::numeric(
            "",
            vec![1, 1],
            NumericData::real(NumericBuffer::I32(vec![data[index]])),
        ),
        HostValue::Complex128 { re, im, .. } => MatVar::numeric(
            "",
            vec![1, 1],
            NumericData::complex(
                NumericBuffer::F64(vec![re[index]]),
                NumericBuffer::F64(vec![im[index]]),
            ),
        ),
        HostValue::Bool { data, .. } => MatVar::logical("", vec![1, 1], vec![data[index]]),
        HostValue::Str(text) => {
            debug_assert_eq!(index, 0);
            Ok(MatVar::string("", text))
        }
        HostValue::StringArray(strings) => Ok(MatVar::string("", &strings[index])),
        HostValue::Sparse { .. } => {
            debug_assert_eq!(index, 0);
            to_matvar("", item)
        }
        HostValue::List { items, .. } => to_matvar("", &items[index]),
        HostValue::Null => Err(MatError::shape("cannot index into a null item")),
    }
}

fn uniform_len(items: &[HostValue]) -> Option<usize> {
    let first = items[0].inference_len();
    items
        .iter()
        .all(|item| item.inference_len() == first)
        .then_some(first)
}

fn struct_from_list(name: &str, items: &[HostValue], names: &[String]) -> Result<MatVar> {
    if names.len() != items.len() {
        return Err(MatError::shape("list has more items than names"));
    }
    if names.iter().any(String::is_empty) {
        return Err(MatError::shape("named and unnamed list items mixed"));
    }
    if items.is_empty() {
        return MatVar::structure(name, Vec::new(), vec![1, 1]);
    }
    let len = uniform_len(items)
        .ok_or_else(|| MatError::shape("struct fields have mixed lengths"))?;
    match len {
        0 => MatVar::structure(name, names.to_vec(), vec![0, 1]),
        1 => {
            let mut var = MatVar::structure(name, names.to_vec(), vec![1, 1])?;
            for (f, (field, item)) in names.iter().zip(items).enumerate() {
                var.set_field(f, 0, to_matvar(field, item)?)?;
            }
            Ok(var)
        }
        n => {
            let mut var = MatVar::structure(name, names.to_vec(), vec![n, 1])?;
            for element in 0..n {
                for (f, (field, item)) in names.iter().zip(items).enumerate() {
                    let mut child = slice_item(item, element)?;
                    child.set_name(field);
                    var.set_field(f, element, child)?;
                }
            }
            Ok(var)
        }
    }
}

/// One ragged item as a `len x 1` cell of its elements.
fn item_as_cell(item: &HostValue) -> Result<MatVar> {
    let len = item.inference_len();
    let mut cell = MatVar::cell("", vec![len, 1])?;
    for j in 0..len {
        cell.set_cell(j, slice_item(item, j)?)?;
    }
    Ok(cell)
}

fn cell_from_list(name: &str, items: &[HostValue]) -> Result<MatVar> {
    if items.is_empty() {
        return MatVar::cell(name, vec![0, 0]);
    }
    let n = items.len();
    let Some(len) = uniform_len(items) else {
        // ragged: a cell of cells
        let mut var = MatVar::cell(name, vec![n, 1])?;
        for (i, item) in items.iter().enumerate() {
            var.set_cell(i, item_as_cell(item)?)?;
        }
        return Ok(var);
    };
    if len == 0
        && items
            .iter()
            .all(|item| matches!(item, HostValue::List { .. }))
    {
        // an empty cell array holding empty arrays
        let mut var = MatVar::cell(name, vec![1, n])?;
        for (i, item) in items.iter().enumerate() {
            var.set_cell(i, to_matvar("", item)?)?;
        }
        return Ok(var);
    }
    let mut var = MatVar::cell(name, vec![n, len])?;
    for j in 0..len {
        for (i, item) in items.iter().enumerate() {
            var.set_cell(j * n + i, slice_item(item, j)?)?;
        }
    }
    Ok(var)
}

/// The dimension attribute a host vector carries: none for rank-2
/// rows and columns, the full shape otherwise.
fn dim_attr(dims: &[usize]) -> Option<Vec<usize>> {
    if dims.len() == 2 && (dims[0] == 1 || dims[1] == 1) {
        None
    } else {
        Some(dims.to_vec())
    }
}

fn numeric_payload<'a>(var: &'a MatVar) -> Result<&'a NumericData> {
    match var.payload() {
        Payload::Numeric(data) => Ok(data),
        Payload::None => Err(MatError::invalid("variable data has not been read")),
        _ => Err(MatError::invalid("payload does not match the class")),
    }
}

/// Whether the class maps to a host integer vector; the wide and
/// unsigned-32 classes widen to doubles instead.
fn is_int_host(class: ClassKind) -> bool {
    matches!(
        class,
        ClassKind::Int8
            | ClassKind::UInt8
            | ClassKind::Int16
            | ClassKind::UInt16
            | ClassKind::Int32
    )
}

fn char_rows(var: &MatVar) -> Result<Vec<String>> {
    let data = match var.payload() {
        Payload::Char(data) => data,
        Payload::None => return Err(MatError::invalid("variable data has not been read")),
        _ => return Err(MatError::invalid("payload does not match the class")),
    };
    if var.rank() != 2 {
        return Err(MatError::shape("char arrays of rank above 2 are not mappable"));
    }
    let (m, n) = (var.dims()[0], var.dims()[1]);
    let mut rows = Vec::with_capacity(m);
    for i in 0..m {
        let row = match data {
            CharData::Utf8(units) => {
                let bytes: Vec<u8> = (0..n).map(|j| units[j * m + i]).collect();
                String::from_utf8_lossy(&bytes).into_owned()
            }
            CharData::Utf16(units) => {
                let wide: Vec<u16> = (0..n).map(|j| units[j * m + i]).collect();
                String::from_utf16_lossy(&wide)
            }
            CharData::Utf32(units) => (0..n)
                .map(|j| char::from_u32(units[j * m + i]).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Maps a variable back to a host value.
pub fn to_host(var: &MatVar, diag: &mut Diagnostics) -> Result<HostValue> {
    match var.class() {
        ClassKind::Function | ClassKind::Opaque => {
            diag.warn(format!(
                "variable {:?} has class {:?}; mapping to null",
                var.name(),
                var.class()
            ));
            Ok(HostValue::Null)
        }
        ClassKind::Object | ClassKind::Empty | ClassKind::Unknown(_) => {
            Err(MatError::UnsupportedClass(var.class()))
        }
        class if class.is_numeric() => {
            let data = numeric_payload(var)?;
            let dim = dim_attr(var.dims());
            if var.is_complex() {
                let im = data
                    .im
                    .as_ref()
                    .ok_or_else(|| MatError::invalid("complex variable without imaginary part"))?;
                Ok(HostValue::Complex128 {
                    re: data.re.to_f64(),
                    im: im.to_f64(),
                    dim,
                })
            } else if var.is_logical() && class == ClassKind::UInt8 {
                let bools = match &data.re {
                    NumericBuffer::U8(bytes) => bytes.iter().map(|&b| b != 0).collect(),
                    other => other.to_f64().iter().map(|&x| x != 0.0).collect(),
                };
                Ok(HostValue::Bool { data: bools, dim })
            } else if is_int_host(class) {
                Ok(HostValue::Int32 {
                    data: data.re.to_i32(),
                    dim,
                })
            } else {
                Ok(HostValue::Real64 {
                    data: data.re.to_f64(),
                    dim,
                })
            }
        }
        ClassKind::Char => {
            let mut rows = char_rows(var)?;
            if rows.len() == 1 {
                Ok(HostValue::Str(rows.pop().unwrap()))
            } else {
                Ok(HostValue::StringArray(rows))
            }
        }
        ClassKind::Sparse => {
            let data = match var.payload() {
                Payload::Sparse(data) => data,
                Payload::None => return Err(MatError::invalid("variable data has not been read")),
                _ => return Err(MatError::invalid("payload does not match the class")),
            };
            let dims = [var.dims()[0], var.dims()[1]];
            match &data.values {
                SparseValues::Complex { re, im } => {
                    // complex sparse expands to a dense matrix
                    let len = dims[0] * dims[1];
                    let mut dense_re = vec![0.0; len];
                    let mut dense_im = vec![0.0; len];
                    for (k, (&r, &i)) in re.iter().zip(im).enumerate() {
                        let idx = data.column_of(k) * dims[0] + data.ir[k] as usize;
                        dense_re[idx] = r;
                        dense_im[idx] = i;
                    }
                    Ok(HostValue::Complex128 {
                        re: dense_re,
                        im: dense_im,
                        dim: dim_attr(var.dims()),
                    })
                }
                SparseValues::Real(values) => Ok(HostValue::Sparse {
                    dims,
                    ir: data.ir.clone(),
                    jc: data.jc.clone(),
                    values: HostSparse::Real(values.clone()),
                }),
                SparseValues::Logical(values) => Ok(HostValue::Sparse {
                    dims,
                    ir: data.ir.clone(),
                    jc: data.jc.clone(),
                    values: HostSparse::Logical(values.clone()),
                }),
            }
        }
        ClassKind::Cell => {
            let children = match var.payload() {
                Payload::Cell(children) => children,
                Payload::None => return Err(MatError::invalid("variable data has not been read")),
                _ => return Err(MatError::invalid("payload does not match the class")),
            };
            let dims = var.dims();
            let flat = dims.len() != 2 || dims[0] == 1 || dims[1] == 1;
            if flat {
                let items = children
                    .iter()
                    .map(|child| to_host(child, diag))
                    .collect::<Result<Vec<_>>>()?;
                Ok(HostValue::list(items))
            } else {
                let (m, n) = (dims[0], dims[1]);
                let mut rows = Vec::with_capacity(m);
                for i in 0..m {
                    let mut row = Vec::with_capacity(n);
                    for j in 0..n {
                        row.push(to_host(&children[j * m + i], diag)?);
                    }
                    rows.push(HostValue::list(row));
                }
                Ok(HostValue::list(rows))
            }
        }
        ClassKind::Struct => struct_to_host(var, diag),
        other => Err(MatError::invalid(format!(
            "class {other:?} cannot cross the host boundary"
        ))),
    }
}

fn struct_to_host(var: &MatVar, diag: &mut Diagnostics) -> Result<HostValue> {
    let data = match var.payload() {
        Payload::Struct(data) => data,
        Payload::None => return Err(MatError::invalid("variable data has not been read")),
        _ => return Err(MatError::invalid("payload does not match the class")),
    };
    let nfields = data.fields.len();
    let nelem = var.len();
    let names = Some(data.fields.clone());

    if nfields == 0 {
        return Ok(HostValue::List {
            items: Vec::new(),
            names: Some(Vec::new()),
        });
    }
    if nelem == 0 {
        return Ok(HostValue::List {
            items: vec![HostValue::Null; nfields],
            names,
        });
    }
    let mut items = Vec::with_capacity(nfields);
    for f in 0..nfields {
        let hosts = (0..nelem)
            .map(|e| to_host(&data.children[e * nfields + f], diag))
            .collect::<Result<Vec<_>>>()?;
        items.push(merge_field(hosts));
    }
    Ok(HostValue::List { items, names })
}

/// Folds one field's per-element values back into a host vector
/// where the elements are uniform scalars (or uniformly empty);
/// anything else stays a nested list.
fn merge_field(hosts: Vec<HostValue>) -> HostValue {
    if hosts.len() == 1 {
        return hosts.into_iter().next().unwrap();
    }
    let scalar_real = |h: &HostValue| {
        matches!(h, HostValue::Real64 { data, dim: None } if data.len() == 1)
    };
    let empty_real = |h: &HostValue| {
        matches!(h, HostValue::Real64 { data, .. } if data.is_empty())
    };
    let scalar_int = |h: &HostValue| {
        matches!(h, HostValue::Int32 { data, dim: None } if data.len() == 1)
    };
    let empty_int = |h: &HostValue| {
        matches!(h, HostValue::Int32 { data, .. } if data.is_empty())
    };
    let scalar_bool = |h: &HostValue| {
        matches!(h, HostValue::Bool { data, dim: None } if data.len() == 1)
    };
    let scalar_complex = |h: &HostValue| {
        matches!(h, HostValue::Complex128 { re, dim: None, .. } if re.len() == 1)
    };

    if hosts.iter().all(scalar_real) || hosts.iter().all(empty_real) {
        let data = hosts
            .iter()
            .flat_map(|h| match h {
                HostValue::Real64 { data, .. } => data.clone(),
                _ => unreachable!(),
            })
            .collect();
        return HostValue::real(data);
    }
    if hosts.iter().all(scalar_int) || hosts.iter().all(empty_int) {
        let data = hosts
            .iter()
            .flat_map(|h| match h {
                HostValue::Int32 { data, .. } => data.clone(),
                _ => unreachable!(),
            })
            .collect();
        return HostValue::int(data);
    }
    if hosts.iter().all(scalar_bool) {
        let data = hosts
            .iter()
            .flat_map(|h| match h {
                HostValue::Bool { data, .. } => data.clone(),
                _ => unreachable!(),
            })
            .collect();
        return HostValue::logical(data);
    }
    if hosts.iter().all(scalar_complex) {
        let (re, im) = hosts
            .iter()
            .map(|h| match h {
                HostValue::Complex128 { re, im, .. } => (re[0], im[0]),
                _ => unreachable!(),
            })
            .unzip();
        return HostValue::Complex128 { re, im, dim: None };
    }
    if hosts.iter().all(|h| matches!(h, HostValue::Str(_))) {
        let strings = hosts
            .into_iter()
            .map(|h| match h {
                HostValue::Str(s) => s,
                _ => unreachable!(),
            })
            .collect();
        return HostValue::StringArray(strings);
    }
    HostValue::list(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matfile_types::DataKind;

    fn roundtrip(value: &HostValue) -> HostValue {
        let var = to_matvar("v", value).unwrap();
        to_host(&var, &mut Diagnostics::new()).unwrap()
    }

    #[test]
    fn null_is_an_empty_double() {
        let var = to_matvar("v", &HostValue::Null).unwrap();
        assert_eq!(var.class(), ClassKind::Double);
        assert_eq!(var.dims(), &[0, 1]);
    }

    #[test]
    fn vector_defaults_to_a_row() {
        let var = to_matvar("v", &HostValue::real(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(var.dims(), &[1, 3]);
        assert_eq!(roundtrip(&HostValue::real(vec![1.0, 2.0, 3.0])),
            HostValue::real(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn dim_attribute_survives() {
        let value = HostValue::Real64 {
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            dim: Some(vec![2, 3]),
        };
        let var = to_matvar("m", &value).unwrap();
        assert_eq!(var.dims(), &[2, 3]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn dim_mismatch_is_shape_error() {
        let value = HostValue::Real64 {
            data: vec![1.0, 2.0],
            dim: Some(vec![3, 3]),
        };
        assert!(matches!(
            to_matvar("m", &value),
            Err(MatError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn int_vector_maps_to_int32_class() {
        let value = HostValue::int(vec![5, 6]);
        let var = to_matvar("i", &value).unwrap();
        assert_eq!(var.class(), ClassKind::Int32);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn bool_vector_is_logical_uint8() {
        let value = HostValue::logical(vec![true, false]);
        let var = to_matvar("b", &value).unwrap();
        assert_eq!(var.class(), ClassKind::UInt8);
        assert!(var.is_logical());
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn string_is_a_char_row() {
        let var = to_matvar("s", &HostValue::Str("abc".into())).unwrap();
        assert_eq!(var.class(), ClassKind::Char);
        assert_eq!(var.dims(), &[1, 3]);
        assert_eq!(
            roundtrip(&HostValue::Str("abc".into())),
            HostValue::Str("abc".into())
        );
    }

    #[test]
    fn equal_strings_pack_into_a_matrix() {
        let value = HostValue::StringArray(vec!["ab".into(), "cd".into()]);
        let var = to_matvar("s", &value).unwrap();
        assert_eq!(var.class(), ClassKind::Char);
        assert_eq!(var.dims(), &[2, 2]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn ragged_strings_become_a_cell() {
        let value = HostValue::StringArray(vec!["ab".into(), "c".into()]);
        let var = to_matvar("s", &value).unwrap();
        assert_eq!(var.class(), ClassKind::Cell);
        assert_eq!(var.dims(), &[2, 1]);
        assert_eq!(var.cell_at(0).unwrap().dims(), &[1, 2]);
    }

    #[test]
    fn named_list_is_a_scalar_struct() {
        let value = HostValue::record(
            vec!["x", "y"],
            vec![HostValue::scalar(3.5), HostValue::Str("t".into())],
        );
        let var = to_matvar("s", &value).unwrap();
        assert_eq!(var.class(), ClassKind::Struct);
        assert_eq!(var.dims(), &[1, 1]);
        assert_eq!(var.fields(), ["x", "y"]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn struct_array_slices_fields() {
        let value = HostValue::record(
            vec!["a", "b"],
            vec![
                HostValue::real(vec![1.0, 2.0, 3.0]),
                HostValue::StringArray(vec!["x".into(), "y".into(), "z".into()]),
            ],
        );
        let var = to_matvar("s", &value).unwrap();
        assert_eq!(var.dims(), &[3, 1]);
        // fields-fastest: a[0], b[0], a[1], b[1], a[2], b[2]
        assert_eq!(var.field_at(0, 1).unwrap().class(), ClassKind::Double);
        assert_eq!(var.field_at(1, 1).unwrap().class(), ClassKind::Char);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn mixed_field_lengths_are_rejected() {
        let value = HostValue::record(
            vec!["a", "b"],
            vec![
                HostValue::real(vec![1.0, 2.0]),
                HostValue::real(vec![1.0, 2.0, 3.0]),
            ],
        );
        assert!(matches!(
            to_matvar("s", &value),
            Err(MatError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn empty_names_are_rejected() {
        let value = HostValue::List {
            items: vec![HostValue::scalar(1.0), HostValue::scalar(2.0)],
            names: Some(vec!["a".into(), "".into()]),
        };
        assert!(matches!(
            to_matvar("s", &value),
            Err(MatError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn empty_named_list_shapes() {
        let empty = HostValue::List {
            items: vec![],
            names: Some(vec![]),
        };
        let var = to_matvar("s", &empty).unwrap();
        assert_eq!(var.dims(), &[1, 1]);
        assert!(var.fields().is_empty());
        assert_eq!(roundtrip(&empty), empty);

        let all_empty = HostValue::record(vec!["a", "b"], vec![HostValue::Null, HostValue::Null]);
        let var = to_matvar("s", &all_empty).unwrap();
        assert_eq!(var.dims(), &[0, 1]);
        assert_eq!(var.fields(), ["a", "b"]);
        assert_eq!(roundtrip(&all_empty), all_empty);
    }

    #[test]
    fn unnamed_list_is_a_cell() {
        let value = HostValue::list(vec![HostValue::scalar(1.0), HostValue::scalar(2.0)]);
        let var = to_matvar("c", &value).unwrap();
        assert_eq!(var.class(), ClassKind::Cell);
        assert_eq!(var.dims(), &[2, 1]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn ragged_list_becomes_cell_of_cells() {
        let value = HostValue::list(vec![
            HostValue::real(vec![1.0, 2.0]),
            HostValue::real(vec![10.0, 20.0, 30.0]),
        ]);
        let var = to_matvar("c", &value).unwrap();
        assert_eq!(var.dims(), &[2, 1]);
        let first = var.cell_at(0).unwrap();
        assert_eq!(first.class(), ClassKind::Cell);
        assert_eq!(first.dims(), &[2, 1]);
        assert_eq!(first.cell_at(1).unwrap().dims(), &[1, 1]);
        let second = var.cell_at(1).unwrap();
        assert_eq!(second.dims(), &[3, 1]);
    }

    #[test]
    fn empty_lists_inside_a_cell() {
        let value = HostValue::list(vec![HostValue::list(vec![]), HostValue::list(vec![])]);
        let var = to_matvar("c", &value).unwrap();
        assert_eq!(var.dims(), &[1, 2]);
        assert_eq!(var.cell_at(0).unwrap().class(), ClassKind::Cell);
        assert_eq!(var.cell_at(0).unwrap().dims(), &[0, 0]);
    }

    #[test]
    fn function_class_maps_to_null_with_warning() {
        let mut var = MatVar::empty();
        var.class = ClassKind::Function;
        var.data_type = DataKind::Unknown(0);
        var.payload = Payload::None;
        let mut diag = Diagnostics::new();
        assert_eq!(to_host(&var, &mut diag).unwrap(), HostValue::Null);
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn object_class_is_an_error() {
        let mut var = MatVar::empty();
        var.class = ClassKind::Object;
        let mut diag = Diagnostics::new();
        assert!(matches!(
            to_host(&var, &mut diag),
            Err(MatError::UnsupportedClass(ClassKind::Object))
        ));
    }

    #[test]
    fn sparse_roundtrip_via_host() {
        let value = HostValue::Sparse {
            dims: [4, 4],
            ir: vec![0, 3, 2],
            jc: vec![0, 1, 1, 1, 3],
            values: HostSparse::Real(vec![1.5, 2.5, 3.5]),
        };
        let var = to_matvar("sp", &value).unwrap();
        assert_eq!(var.class(), ClassKind::Sparse);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn complex_sparse_expands_dense() {
        let data = SparseData {
            nzmax: 1,
            ir: vec![1],
            jc: vec![0, 0, 1],
            values: SparseValues::Complex {
                re: vec![5.0],
                im: vec![-5.0],
            },
        };
        let var = MatVar::sparse("z", vec![2, 2], data).unwrap();
        let host = to_host(&var, &mut Diagnostics::new()).unwrap();
        match host {
            HostValue::Complex128 { re, im, dim } => {
                assert_eq!(re, vec![0.0, 0.0, 0.0, 5.0]);
                assert_eq!(im, vec![0.0, 0.0, 0.0, -5.0]);
                assert_eq!(dim, Some(vec![2, 2]));
            }
            other => panic!("unexpected host value {other:?}"),
        }
    }
}
