// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The version 4 record codec.
//!
//! A v4 file has no file header: it is a bare sequence of variable
//! records, each opened by the MOPT integer. Byte order is
//! recovered per record: a MOPT outside `0..=4052` in the current
//! interpretation is re-read byte-swapped, and the decoded machine
//! digit then names the order the rest of the record uses.

use crate::error::{MatError, Result};
use crate::slab;
use crate::sparse::SparseData;
use crate::stream::{self, Endian};
use crate::var::{CharData, MatVar, NumericBuffer, NumericData, Payload};
use byteorder::{LittleEndian, WriteBytesExt};
use matfile_types::v4::{Mopt, MoptError, V4ByteOrder, V4Class, V4DataType};
use matfile_types::{ClassKind, DataKind};
use std::io::{Read, Seek, SeekFrom, Write};

/// Upper bound on a v4 variable-name length; longer values mean the
/// record is garbage, not a name.
const MAX_NAME_LEN: i32 = 1 << 16;

fn data_kind_of(dt: V4DataType) -> DataKind {
    match dt {
        V4DataType::Double => DataKind::Double,
        V4DataType::Single => DataKind::Single,
        V4DataType::Int32 => DataKind::Int32,
        V4DataType::Int16 => DataKind::Int16,
        V4DataType::UInt16 => DataKind::UInt16,
        V4DataType::UInt8 => DataKind::UInt8,
        V4DataType::Unknown(_) => DataKind::Unknown(0),
    }
}

fn class_kind_of(class: V4Class) -> ClassKind {
    match class {
        V4Class::Numeric => ClassKind::Double,
        V4Class::Char => ClassKind::Char,
        V4Class::Sparse => ClassKind::Sparse,
        V4Class::Unknown(_) => ClassKind::Unknown(0),
    }
}

/// Reads the next record header, leaving the stream positioned after
/// the record's data. Returns the variable and the byte order the
/// record decoded with, or `None` at end of file.
pub(crate) fn read_next_info4<R: Read + Seek>(r: &mut R) -> Result<Option<(MatVar, Endian)>> {
    let mut word = [0u8; 4];
    match r.read_exact(&mut word) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let raw = i32::from_le_bytes(word);
    let mopt = match Mopt::decode(raw) {
        Ok(mopt) => mopt,
        Err(MoptError::OutOfRange(_)) => Mopt::decode(raw.swap_bytes())
            .map_err(|e| MatError::invalid(format!("bad MOPT header: {e}")))?,
        Err(e) => return Err(MatError::invalid(format!("bad MOPT header: {e}"))),
    };
    let endian = match mopt.byte_order {
        V4ByteOrder::LittleEndian => Endian::Little,
        V4ByteOrder::BigEndian => Endian::Big,
        V4ByteOrder::Unknown(_) => unreachable!("Mopt::decode rejects unknown byte orders"),
    };

    let mrows = endian.read_i32(r)?;
    let ncols = endian.read_i32(r)?;
    let imagf = endian.read_i32(r)?;
    let namlen = endian.read_i32(r)?;
    if mrows < 0 || ncols < 0 {
        return Err(MatError::invalid("negative v4 matrix dimension"));
    }
    if !(1..=MAX_NAME_LEN).contains(&namlen) {
        return Err(MatError::invalid(format!("bad v4 name length {namlen}")));
    }
    let name_bytes = slab::read_exact_alloc(r, namlen as usize)?;
    let name = String::from_utf8_lossy(
        name_bytes.split(|&b| b == 0).next().unwrap_or(&name_bytes),
    )
    .into_owned();

    let data_type = data_kind_of(mopt.data_type);
    let class = class_kind_of(mopt.class);
    let dims = vec![mrows as usize, ncols as usize];

    let mut var = MatVar {
        name,
        class,
        data_type,
        dims,
        complex: imagf != 0,
        logical: false,
        global: false,
        payload: Payload::None,
        data_offset: None,
    };
    var.data_offset = Some(stream::tell(r)?);

    // Skip the data with the complex flag as declared; the sparse
    // promotion below does not change the record's size.
    let mut nbytes = (mrows as u64)
        .checked_mul(ncols as u64)
        .and_then(|n| n.checked_mul(data_type.size_of() as u64))
        .ok_or_else(|| MatError::invalid("v4 record size overflows"))?;
    if var.complex {
        nbytes *= 2;
    }
    stream::skip(r, nbytes)?;

    // A sparse record with four columns carries imaginary values in
    // the fourth even when imagf is zero.
    if !var.complex
        && var.class == ClassKind::Sparse
        && var.data_type == DataKind::Double
        && ncols == 4
    {
        var.complex = true;
    }

    Ok(Some((var, endian)))
}

/// Loads the payload of a header previously returned by
/// [read_next_info4].
pub(crate) fn read_data4<R: Read + Seek>(r: &mut R, endian: Endian, var: &mut MatVar) -> Result<()> {
    let offset = var
        .data_offset
        .ok_or_else(|| MatError::invalid("variable has no recorded data position"))?;
    r.seek(SeekFrom::Start(offset))?;
    let n = var.len();
    match var.class {
        ClassKind::Double => {
            let re = slab::read_numeric(r, endian, var.data_type, ClassKind::Double, n)?;
            let im = if var.complex {
                Some(slab::read_numeric(
                    r,
                    endian,
                    var.data_type,
                    ClassKind::Double,
                    n,
                )?)
            } else {
                None
            };
            var.payload = Payload::Numeric(NumericData { re, im });
            var.data_type = DataKind::Double;
        }
        ClassKind::Char => {
            let units = match slab::read_numeric(r, endian, var.data_type, ClassKind::UInt8, n)? {
                NumericBuffer::U8(bytes) => bytes,
                _ => unreachable!("UInt8 reads produce byte buffers"),
            };
            var.payload = Payload::Char(CharData::Utf8(units));
            var.data_type = DataKind::UInt8;
        }
        ClassKind::Sparse => {
            let buf = match slab::read_numeric(r, endian, var.data_type, ClassKind::Double, n)? {
                NumericBuffer::F64(values) => values,
                _ => unreachable!("Double reads produce f64 buffers"),
            };
            let (data, dims) = SparseData::from_v4_columns(&buf, var.dims[0], var.dims[1])?;
            var.complex = data.values.is_complex();
            var.dims = vec![dims[0], dims[1]];
            var.payload = Payload::Sparse(data);
            var.data_type = DataKind::Double;
        }
        other => return Err(MatError::invalid(format!("v4 cannot hold class {other:?}"))),
    }
    Ok(())
}

fn v4_numeric_type(class: ClassKind) -> Result<V4DataType> {
    Ok(match class {
        ClassKind::Double => V4DataType::Double,
        ClassKind::Single => V4DataType::Single,
        ClassKind::Int32 => V4DataType::Int32,
        ClassKind::Int16 => V4DataType::Int16,
        ClassKind::UInt16 => V4DataType::UInt16,
        ClassKind::UInt8 => V4DataType::UInt8,
        other => {
            return Err(MatError::invalid(format!(
                "class {other:?} is not representable in a v4 file"
            )))
        }
    })
}

fn char_bytes(data: &CharData) -> Result<Vec<u8>> {
    match data {
        CharData::Utf8(v) => Ok(v.clone()),
        CharData::Utf16(v) => v
            .iter()
            .map(|&u| {
                u8::try_from(u)
                    .map_err(|_| MatError::invalid("v4 char data is limited to single bytes"))
            })
            .collect(),
        CharData::Utf32(v) => v
            .iter()
            .map(|&u| {
                u8::try_from(u)
                    .map_err(|_| MatError::invalid("v4 char data is limited to single bytes"))
            })
            .collect(),
    }
}

/// Serializes one variable as a v4 record. Only rank-2 numeric,
/// char, and sparse variables exist in the v4 format.
pub(crate) fn write_var4<W: Write>(w: &mut W, var: &MatVar) -> Result<()> {
    var.validate_for_write()?;
    if var.rank() != 2 {
        return Err(MatError::invalid("v4 variables must have rank 2"));
    }

    let (mopt, mrows, ncols, imagf) = match &var.payload {
        Payload::Numeric(data) => (
            Mopt {
                byte_order: V4ByteOrder::LittleEndian,
                data_type: v4_numeric_type(var.class)?,
                class: V4Class::Numeric,
            },
            var.dims[0],
            var.dims[1],
            data.is_complex(),
        ),
        Payload::Char(_) => (
            Mopt {
                byte_order: V4ByteOrder::LittleEndian,
                data_type: V4DataType::UInt8,
                class: V4Class::Char,
            },
            var.dims[0],
            var.dims[1],
            false,
        ),
        Payload::Sparse(data) => (
            Mopt {
                byte_order: V4ByteOrder::LittleEndian,
                data_type: V4DataType::Double,
                class: V4Class::Sparse,
            },
            data.values.len() + 1,
            if data.values.is_complex() { 4 } else { 3 },
            // imagf stays clear for sparse; the fourth column carries
            // the imaginary values
            false,
        ),
        _ => {
            return Err(MatError::invalid(format!(
                "class {:?} is not representable in a v4 file",
                var.class
            )))
        }
    };

    w.write_i32::<LittleEndian>(mopt.encode())?;
    w.write_i32::<LittleEndian>(mrows as i32)?;
    w.write_i32::<LittleEndian>(ncols as i32)?;
    w.write_i32::<LittleEndian>(imagf as i32)?;
    w.write_i32::<LittleEndian>(var.name.len() as i32 + 1)?;
    w.write_all(var.name.as_bytes())?;
    w.write_all(&[0])?;

    match &var.payload {
        Payload::Numeric(data) => {
            slab::write_buffer(w, &data.re)?;
            if let Some(im) = &data.im {
                slab::write_buffer(w, im)?;
            }
        }
        Payload::Char(data) => {
            w.write_all(&char_bytes(data)?)?;
        }
        Payload::Sparse(data) => {
            let flat = data.to_v4_columns(&var.dims)?;
            slab::write_buffer(w, &NumericBuffer::F64(flat))?;
        }
        _ => unreachable!("rejected above"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseValues;
    use byteorder::BigEndian;
    use std::io::Cursor;

    fn roundtrip(var: &MatVar) -> MatVar {
        let mut buf = Vec::new();
        write_var4(&mut buf, var).unwrap();
        let mut cursor = Cursor::new(buf);
        let (mut back, endian) = read_next_info4(&mut cursor).unwrap().unwrap();
        assert_eq!(endian, Endian::Little);
        read_data4(&mut cursor, endian, &mut back).unwrap();
        back
    }

    #[test]
    fn numeric_roundtrip() {
        let var = MatVar::numeric(
            "A",
            vec![2, 3],
            NumericData::real(NumericBuffer::F64(vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0])),
        )
        .unwrap();
        let back = roundtrip(&var);
        assert_eq!(back.name(), "A");
        assert_eq!(back.dims(), &[2, 3]);
        assert_eq!(back.payload(), var.payload());
    }

    #[test]
    fn int16_storage_reads_back_as_double() {
        let var = MatVar::numeric(
            "i",
            vec![1, 3],
            NumericData::real(NumericBuffer::I16(vec![1, -2, 3])),
        )
        .unwrap();
        let back = roundtrip(&var);
        assert_eq!(back.class(), ClassKind::Double);
        match back.payload() {
            Payload::Numeric(data) => {
                assert_eq!(data.re, NumericBuffer::F64(vec![1.0, -2.0, 3.0]))
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn complex_roundtrip() {
        let var = MatVar::numeric(
            "z",
            vec![1, 2],
            NumericData::complex(
                NumericBuffer::F64(vec![1.0, 2.0]),
                NumericBuffer::F64(vec![-1.0, -2.0]),
            ),
        )
        .unwrap();
        let back = roundtrip(&var);
        assert!(back.is_complex());
        assert_eq!(back.payload(), var.payload());
    }

    #[test]
    fn char_roundtrip() {
        let var = MatVar::character(
            "s",
            vec![1, 5],
            CharData::Utf8(b"hello".to_vec()),
        )
        .unwrap();
        let back = roundtrip(&var);
        assert_eq!(back.class(), ClassKind::Char);
        assert_eq!(back.payload(), var.payload());
    }

    #[test]
    fn sparse_complex_promotion() {
        let var = MatVar::sparse(
            "sp",
            vec![3, 2],
            SparseData {
                nzmax: 2,
                ir: vec![0, 2],
                jc: vec![0, 1, 2],
                values: SparseValues::Complex {
                    re: vec![1.0, 2.0],
                    im: vec![3.0, 4.0],
                },
            },
        )
        .unwrap();
        let mut buf = Vec::new();
        write_var4(&mut buf, &var).unwrap();
        let mut cursor = Cursor::new(buf);
        let (mut back, endian) = read_next_info4(&mut cursor).unwrap().unwrap();
        // imagf is written as zero, the four columns alone mark it
        assert!(back.is_complex());
        read_data4(&mut cursor, endian, &mut back).unwrap();
        assert_eq!(back.dims(), &[3, 2]);
        assert_eq!(back.payload(), var.payload());
    }

    #[test]
    fn byteswapped_record() {
        // the same record a big-endian host would have written
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(1000).unwrap(); // M=1, double, numeric
        buf.write_i32::<BigEndian>(1).unwrap();
        buf.write_i32::<BigEndian>(2).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        buf.write_i32::<BigEndian>(2).unwrap();
        buf.extend_from_slice(b"x\0");
        buf.write_f64::<BigEndian>(1.5).unwrap();
        buf.write_f64::<BigEndian>(-2.5).unwrap();

        let mut cursor = Cursor::new(buf);
        let (mut var, endian) = read_next_info4(&mut cursor).unwrap().unwrap();
        assert_eq!(endian, Endian::Big);
        assert_eq!(var.name(), "x");
        read_data4(&mut cursor, endian, &mut var).unwrap();
        match var.payload() {
            Payload::Numeric(data) => assert_eq!(data.re, NumericBuffer::F64(vec![1.5, -2.5])),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn eof_is_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_next_info4(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn cell_is_rejected() {
        let var = MatVar::cell("c", vec![1, 1]).unwrap();
        assert!(write_var4(&mut Vec::new(), &var).is_err());
    }
}
