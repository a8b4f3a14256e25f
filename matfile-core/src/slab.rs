// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dense numeric reads and writes.
//!
//! Reads convert elementwise between the on-disk [DataKind] and the
//! element type of the requesting class, so a double-class array
//! stored as int16 loads as `f64` without a second pass. Besides
//! full reads, `(start, stride, edge)` slabs are supported in one,
//! two, and N dimensions, walking the source in column-major order.

use crate::error::{MatError, Result};
use crate::stream::Endian;
use crate::var::{CharData, NumericBuffer};
use byteorder::{LittleEndian, WriteBytesExt};
use matfile_types::{ClassKind, DataKind};
use std::io::{Read, Seek, SeekFrom, Write};

/// Reads `n` bytes into a freshly reserved buffer, surfacing a
/// refused allocation as an error rather than aborting.
pub(crate) fn read_exact_alloc<R: Read>(r: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(n)?;
    buf.resize(n, 0);
    r.read_exact(&mut buf)?;
    Ok(buf)
}

macro_rules! define_read_as {
    ($name:ident, $ty:ty) => {
        fn $name<R: Read>(
            r: &mut R,
            endian: Endian,
            disk: DataKind,
            count: usize,
        ) -> Result<Vec<$ty>> {
            let esize = disk.size_of();
            if esize == 0 {
                return Err(MatError::invalid(format!(
                    "data type {disk:?} does not describe numeric elements"
                )));
            }
            let nbytes = count
                .checked_mul(esize)
                .ok_or_else(|| MatError::invalid("numeric payload size overflows"))?;
            let raw = read_exact_alloc(r, nbytes)?;
            let mut out = Vec::new();
            out.try_reserve_exact(count)?;
            match disk {
                DataKind::Int8 => out.extend(raw.iter().map(|&b| b as i8 as $ty)),
                DataKind::UInt8 | DataKind::Utf8 => out.extend(raw.iter().map(|&b| b as $ty)),
                DataKind::Int16 => {
                    out.extend(raw.chunks_exact(2).map(|c| endian.read_i16_from(c) as $ty))
                }
                DataKind::UInt16 | DataKind::Utf16 => {
                    out.extend(raw.chunks_exact(2).map(|c| endian.read_u16_from(c) as $ty))
                }
                DataKind::Int32 => {
                    out.extend(raw.chunks_exact(4).map(|c| endian.read_i32_from(c) as $ty))
                }
                DataKind::UInt32 | DataKind::Utf32 => {
                    out.extend(raw.chunks_exact(4).map(|c| endian.read_u32_from(c) as $ty))
                }
                DataKind::Int64 => {
                    out.extend(raw.chunks_exact(8).map(|c| endian.read_i64_from(c) as $ty))
                }
                DataKind::UInt64 => {
                    out.extend(raw.chunks_exact(8).map(|c| endian.read_u64_from(c) as $ty))
                }
                DataKind::Single => {
                    out.extend(raw.chunks_exact(4).map(|c| endian.read_f32_from(c) as $ty))
                }
                DataKind::Double => {
                    out.extend(raw.chunks_exact(8).map(|c| endian.read_f64_from(c) as $ty))
                }
                _ => unreachable!("size_of() is zero for non-scalar kinds"),
            }
            Ok(out)
        }
    };
}

define_read_as!(read_as_i8, i8);
define_read_as!(read_as_u8, u8);
define_read_as!(read_as_i16, i16);
define_read_as!(read_as_u16, u16);
define_read_as!(read_as_i32, i32);
define_read_as!(read_as_u32, u32);
define_read_as!(read_as_i64, i64);
define_read_as!(read_as_u64, u64);
define_read_as!(read_as_f32, f32);
define_read_as!(read_as_f64, f64);

/// Reads `count` elements stored as `disk`, converting them to the
/// element type of `class`.
pub fn read_numeric<R: Read>(
    r: &mut R,
    endian: Endian,
    disk: DataKind,
    class: ClassKind,
    count: usize,
) -> Result<NumericBuffer> {
    Ok(match class {
        ClassKind::Int8 => NumericBuffer::I8(read_as_i8(r, endian, disk, count)?),
        ClassKind::UInt8 => NumericBuffer::U8(read_as_u8(r, endian, disk, count)?),
        ClassKind::Int16 => NumericBuffer::I16(read_as_i16(r, endian, disk, count)?),
        ClassKind::UInt16 => NumericBuffer::U16(read_as_u16(r, endian, disk, count)?),
        ClassKind::Int32 => NumericBuffer::I32(read_as_i32(r, endian, disk, count)?),
        ClassKind::UInt32 => NumericBuffer::U32(read_as_u32(r, endian, disk, count)?),
        ClassKind::Int64 => NumericBuffer::I64(read_as_i64(r, endian, disk, count)?),
        ClassKind::UInt64 => NumericBuffer::U64(read_as_u64(r, endian, disk, count)?),
        ClassKind::Single => NumericBuffer::F32(read_as_f32(r, endian, disk, count)?),
        ClassKind::Double | ClassKind::Sparse => {
            NumericBuffer::F64(read_as_f64(r, endian, disk, count)?)
        }
        other => {
            return Err(MatError::invalid(format!(
                "class {other:?} has no numeric element type"
            )))
        }
    })
}

/// Reads `count` stored i32 values (dimension lists, sparse row and
/// column indices), whatever integer type the element used on disk.
pub fn read_index_values<R: Read>(
    r: &mut R,
    endian: Endian,
    disk: DataKind,
    count: usize,
) -> Result<Vec<i32>> {
    read_as_i32(r, endian, disk, count)
}

/// Reads `count` char code units, keeping the width the element was
/// stored with.
pub(crate) fn read_char_units<R: Read>(
    r: &mut R,
    endian: Endian,
    disk: DataKind,
    count: usize,
) -> Result<CharData> {
    Ok(match disk {
        DataKind::Utf8 | DataKind::UInt8 | DataKind::Int8 => {
            CharData::Utf8(read_as_u8(r, endian, disk, count)?)
        }
        DataKind::Utf16 | DataKind::UInt16 | DataKind::Int16 => {
            CharData::Utf16(read_as_u16(r, endian, disk, count)?)
        }
        DataKind::Utf32 | DataKind::UInt32 | DataKind::Int32 => {
            CharData::Utf32(read_as_u32(r, endian, disk, count)?)
        }
        other => {
            return Err(MatError::invalid(format!(
                "data type {other:?} cannot hold character data"
            )))
        }
    })
}

/// Validates slab bounds: `start[k] + (edge[k] - 1) * stride[k]`
/// must stay below `dims[k]` in every dimension.
pub fn check_slab(dims: &[usize], start: &[usize], stride: &[usize], edge: &[usize]) -> Result<()> {
    if start.len() != dims.len() || stride.len() != dims.len() || edge.len() != dims.len() {
        return Err(MatError::OutOfRange);
    }
    for k in 0..dims.len() {
        if edge[k] == 0 {
            continue;
        }
        if stride[k] == 0 && edge[k] > 1 {
            return Err(MatError::OutOfRange);
        }
        let last = stride[k]
            .checked_mul(edge[k] - 1)
            .and_then(|n| n.checked_add(start[k]))
            .ok_or(MatError::OutOfRange)?;
        if last >= dims[k] {
            return Err(MatError::OutOfRange);
        }
    }
    Ok(())
}

/// Column-major linear indices of a slab selection, in output order.
pub fn slab_indices(
    dims: &[usize],
    start: &[usize],
    stride: &[usize],
    edge: &[usize],
) -> Result<Vec<usize>> {
    check_slab(dims, start, stride, edge)?;
    let total = edge.iter().product();
    let mut out = Vec::new();
    out.try_reserve_exact(total)?;
    if total == 0 {
        return Ok(out);
    }
    let rank = dims.len();
    let mut counters = vec![0usize; rank];
    'outer: loop {
        let mut linear = 0usize;
        let mut scale = 1usize;
        for k in 0..rank {
            linear += (start[k] + counters[k] * stride[k]) * scale;
            scale *= dims[k];
        }
        out.push(linear);
        for k in 0..rank {
            counters[k] += 1;
            if counters[k] < edge[k] {
                continue 'outer;
            }
            counters[k] = 0;
        }
        break;
    }
    Ok(out)
}

/// Reads a 1-D slab over the flattened array whose data begins at
/// `base` in the stream.
pub fn read_slab_1d<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    disk: DataKind,
    class: ClassKind,
    base: u64,
    nmemb: usize,
    start: usize,
    stride: usize,
    edge: usize,
) -> Result<NumericBuffer> {
    check_slab(&[nmemb], &[start], &[stride], &[edge])?;
    let esize = disk.size_of() as u64;
    if stride <= 1 {
        r.seek(SeekFrom::Start(base + start as u64 * esize))?;
        return read_numeric(r, endian, disk, class, edge);
    }
    let mut raw = Vec::new();
    raw.try_reserve_exact(edge * esize as usize)?;
    let mut element = vec![0u8; esize as usize];
    for k in 0..edge {
        r.seek(SeekFrom::Start(base + (start + k * stride) as u64 * esize))?;
        r.read_exact(&mut element)?;
        raw.extend_from_slice(&element);
    }
    read_numeric(
        &mut std::io::Cursor::new(raw),
        endian,
        disk,
        class,
        edge,
    )
}

/// Reads an N-D slab (`rank >= 1`), producing a contiguous
/// column-major buffer of shape `edge`.
pub fn read_slab_nd<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    disk: DataKind,
    class: ClassKind,
    base: u64,
    dims: &[usize],
    start: &[usize],
    stride: &[usize],
    edge: &[usize],
) -> Result<NumericBuffer> {
    let indices = slab_indices(dims, start, stride, edge)?;
    let esize = disk.size_of() as u64;
    if esize == 0 {
        return Err(MatError::invalid(format!(
            "data type {disk:?} does not describe numeric elements"
        )));
    }
    let mut raw = Vec::new();
    raw.try_reserve_exact(indices.len() * esize as usize)?;
    let mut element = vec![0u8; esize as usize];
    let mut expect: Option<u64> = None;
    for &linear in &indices {
        let offset = base + linear as u64 * esize;
        if expect != Some(offset) {
            r.seek(SeekFrom::Start(offset))?;
        }
        r.read_exact(&mut element)?;
        raw.extend_from_slice(&element);
        expect = Some(offset + esize);
    }
    read_numeric(
        &mut std::io::Cursor::new(raw),
        endian,
        disk,
        class,
        indices.len(),
    )
}

/// Reads a 2-D slab; a thin wrapper that keeps the common matrix
/// case explicit.
#[allow(clippy::too_many_arguments)]
pub fn read_slab_2d<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    disk: DataKind,
    class: ClassKind,
    base: u64,
    dims: [usize; 2],
    start: [usize; 2],
    stride: [usize; 2],
    edge: [usize; 2],
) -> Result<NumericBuffer> {
    read_slab_nd(r, endian, disk, class, base, &dims, &start, &stride, &edge)
}

/// Gathers a slab from an already loaded buffer.
pub fn gather_slab(
    buffer: &NumericBuffer,
    dims: &[usize],
    start: &[usize],
    stride: &[usize],
    edge: &[usize],
) -> Result<NumericBuffer> {
    let indices = slab_indices(dims, start, stride, edge)?;
    if indices.iter().any(|&i| i >= buffer.len()) {
        return Err(MatError::OutOfRange);
    }
    Ok(buffer.gather(&indices))
}

/// Writes a numeric buffer little-endian, returning the byte count.
pub fn write_buffer<W: Write>(w: &mut W, buf: &NumericBuffer) -> Result<u64> {
    let nbytes = buf.len() as u64 * buf.data_kind().size_of() as u64;
    match buf {
        NumericBuffer::I8(v) => {
            for &x in v {
                w.write_i8(x)?;
            }
        }
        NumericBuffer::U8(v) => w.write_all(v)?,
        NumericBuffer::I16(v) => {
            for &x in v {
                w.write_i16::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::U16(v) => {
            for &x in v {
                w.write_u16::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::I32(v) => {
            for &x in v {
                w.write_i32::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::U32(v) => {
            for &x in v {
                w.write_u32::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::I64(v) => {
            for &x in v {
                w.write_i64::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::U64(v) => {
            for &x in v {
                w.write_u64::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::F32(v) => {
            for &x in v {
                w.write_f32::<LittleEndian>(x)?;
            }
        }
        NumericBuffer::F64(v) => {
            for &x in v {
                w.write_f64::<LittleEndian>(x)?;
            }
        }
    }
    Ok(nbytes)
}

/// Writes char code units little-endian, returning the byte count.
pub fn write_char<W: Write>(w: &mut W, data: &CharData) -> Result<u64> {
    match data {
        CharData::Utf8(v) => {
            w.write_all(v)?;
            Ok(v.len() as u64)
        }
        CharData::Utf16(v) => {
            for &x in v {
                w.write_u16::<LittleEndian>(x)?;
            }
            Ok(v.len() as u64 * 2)
        }
        CharData::Utf32(v) => {
            for &x in v {
                w.write_u32::<LittleEndian>(x)?;
            }
            Ok(v.len() as u64 * 4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn le_doubles(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn converts_int16_to_double() {
        let bytes: Vec<u8> = [1i16, -2, 300]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let buf = read_numeric(
            &mut Cursor::new(bytes),
            Endian::Little,
            DataKind::Int16,
            ClassKind::Double,
            3,
        )
        .unwrap();
        assert_eq!(buf, NumericBuffer::F64(vec![1.0, -2.0, 300.0]));
    }

    #[test]
    fn converts_big_endian_double_to_int32() {
        let bytes: Vec<u8> = [1.0f64, -7.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let buf = read_numeric(
            &mut Cursor::new(bytes),
            Endian::Big,
            DataKind::Double,
            ClassKind::Int32,
            2,
        )
        .unwrap();
        assert_eq!(buf, NumericBuffer::I32(vec![1, -7]));
    }

    #[test]
    fn rejects_non_scalar_kind() {
        assert!(read_numeric(
            &mut Cursor::new(Vec::new()),
            Endian::Little,
            DataKind::Matrix,
            ClassKind::Double,
            0,
        )
        .is_err());
    }

    #[test]
    fn slab_bounds() {
        assert!(check_slab(&[10], &[0], &[3], &[4]).is_ok()); // last = 9
        assert!(matches!(
            check_slab(&[10], &[0], &[3], &[5]),
            Err(MatError::OutOfRange)
        ));
        assert!(matches!(
            check_slab(&[10], &[10], &[1], &[1]),
            Err(MatError::OutOfRange)
        ));
        assert!(check_slab(&[10], &[9], &[1], &[0]).is_ok());
    }

    #[test]
    fn slab_indices_walk_column_major() {
        // 3x4 matrix, rows 0..2 step 2, cols 1..3 step 2
        let idx = slab_indices(&[3, 4], &[0, 1], &[2, 2], &[2, 2]).unwrap();
        assert_eq!(idx, vec![3, 5, 9, 11]);
    }

    #[test]
    fn read_1d_slab_with_stride() {
        let data = le_doubles(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut cursor = Cursor::new(data);
        let buf = read_slab_1d(
            &mut cursor,
            Endian::Little,
            DataKind::Double,
            ClassKind::Double,
            0,
            6,
            1,
            2,
            3,
        )
        .unwrap();
        assert_eq!(buf, NumericBuffer::F64(vec![1.0, 3.0, 5.0]));
    }

    #[test]
    fn read_2d_slab() {
        // 2x3 column-major [[1,3,5],[2,4,6]]
        let data = le_doubles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut cursor = Cursor::new(data);
        let buf = read_slab_2d(
            &mut cursor,
            Endian::Little,
            DataKind::Double,
            ClassKind::Double,
            0,
            [2, 3],
            [1, 0],
            [1, 2],
            [1, 2],
        )
        .unwrap();
        assert_eq!(buf, NumericBuffer::F64(vec![2.0, 6.0]));
    }

    #[test]
    fn gather_matches_stream_slab() {
        let buffer = NumericBuffer::F64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = gather_slab(&buffer, &[2, 3], &[0, 0], &[1, 1], &[2, 2]).unwrap();
        assert_eq!(out, NumericBuffer::F64(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn write_buffer_little_endian() {
        let mut out = Vec::new();
        let n = write_buffer(&mut out, &NumericBuffer::I16(vec![1, -1])).unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, vec![1, 0, 0xff, 0xff]);
    }
}
