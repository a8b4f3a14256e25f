// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The version 5 codec.
//!
//! A v5 file is a 128-byte header followed by tagged elements. Each
//! top-level element is a miMATRIX (one variable subtree, parsed
//! recursively for cell and struct payloads) or a miCOMPRESSED
//! wrapping one deflated miMATRIX. Readers accept both the full
//! 8-byte tag and the compact small-element form everywhere; the
//! writer emits the compact form whenever a payload fits.

use crate::diag::Diagnostics;
use crate::error::{MatError, Result};
use crate::slab;
use crate::sparse::{SparseData, SparseValues};
use crate::stream::{self, Endian};
use crate::var::{dim_product, CharData, MatVar, NumericBuffer, NumericData, Payload, StructData};
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use matfile_types::flags::{pack_array_flags, unpack_array_flags, ArrayFlags};
use matfile_types::v5::{self, pad8, padding_for, ElementTag};
use matfile_types::{ClassKind, DataKind};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Cap on metadata elements (names, dimension lists, field-name
/// blocks); anything larger is a corrupt tag, not metadata.
const MAX_METADATA_BYTES: u32 = 1 << 26;

/// A parsed v5 file header.
#[derive(Clone, Debug)]
pub struct Header {
    pub text: String,
    pub version: u16,
    pub endian: Endian,
}

fn default_description() -> String {
    format!(
        "MATLAB 5.0 MAT-file, Platform: {}-{}, Created by: matfile-core {} on {}",
        std::env::consts::ARCH,
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%a %b %e %H:%M:%S %Y"),
    )
}

/// Writes the 128-byte file header. Output is always little-endian.
pub(crate) fn write_header<W: Write>(w: &mut W, description: Option<&str>) -> Result<()> {
    let text = match description {
        Some(text) => text.to_string(),
        None => default_description(),
    };
    let mut padded = [b' '; v5::HEADER_TEXT_SIZE];
    let bytes = text.as_bytes();
    let n = bytes.len().min(v5::HEADER_TEXT_SIZE);
    padded[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&padded)?;
    stream::write_zeros(w, 8)?;
    w.write_u16::<LittleEndian>(v5::HEADER_VERSION)?;
    w.write_all(&v5::ENDIAN_LITTLE)?;
    Ok(())
}

/// Reads and validates the 128-byte file header, detecting the
/// file's byte order from the endian indicator.
pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let bytes = slab::read_exact_alloc(r, v5::HEADER_SIZE)?;
    let endian = if bytes[126..128] == v5::ENDIAN_BIG {
        Endian::Big
    } else if bytes[126..128] == v5::ENDIAN_LITTLE {
        Endian::Little
    } else {
        return Err(MatError::invalid("bad v5 endian indicator"));
    };
    let version = endian.read_u16_from(&bytes[124..126]);
    if version != v5::HEADER_VERSION {
        return Err(MatError::UnsupportedVersion(version));
    }
    let text = String::from_utf8_lossy(&bytes[..v5::HEADER_TEXT_SIZE])
        .trim_end()
        .to_string();
    Ok(Header {
        text,
        version,
        endian,
    })
}

/// Reads an element tag in either form. The `bool` is true for the
/// compact form, whose payload shares the tag's 8-byte unit.
fn read_tag<R: Read>(r: &mut R, endian: Endian) -> Result<(ElementTag, bool)> {
    let word = endian.read_u32(r)?;
    if let Some(tag) = ElementTag::from_first_word(word) {
        if tag.num_bytes > v5::SMALL_ELEMENT_MAX {
            return Err(MatError::invalid(format!(
                "compact element claims {} bytes",
                tag.num_bytes
            )));
        }
        Ok((tag, true))
    } else {
        let num_bytes = endian.read_u32(r)?;
        Ok((ElementTag::new(DataKind::from(word), num_bytes), false))
    }
}

/// Zero padding that follows an element's payload.
fn payload_padding(tag: &ElementTag, small: bool) -> u64 {
    if small {
        u64::from(v5::SMALL_ELEMENT_MAX - tag.num_bytes)
    } else {
        padding_for(u64::from(tag.num_bytes))
    }
}

/// Reads a whole metadata element (name, dims, field names) into an
/// owned buffer, consuming its padding.
fn read_element_bytes<R: Read + Seek>(r: &mut R, endian: Endian) -> Result<(DataKind, Bytes)> {
    let (tag, small) = read_tag(r, endian)?;
    if tag.num_bytes > MAX_METADATA_BYTES {
        return Err(MatError::invalid(format!(
            "metadata element of {} bytes",
            tag.num_bytes
        )));
    }
    let mut buf = BytesMut::zeroed(tag.num_bytes as usize);
    r.read_exact(&mut buf)?;
    stream::skip(r, payload_padding(&tag, small))?;
    Ok((tag.data_type, buf.freeze()))
}

/// Skips one element, whatever its payload.
fn skip_element<R: Read + Seek>(r: &mut R, endian: Endian) -> Result<()> {
    let (tag, small) = read_tag(r, endian)?;
    let skip = if small {
        u64::from(v5::SMALL_ELEMENT_MAX)
    } else {
        pad8(u64::from(tag.num_bytes))
    };
    stream::skip(r, skip)?;
    Ok(())
}

/// Reads a numeric element, converting its on-disk type to the
/// element type of `class`, and checks the element holds exactly
/// `expected` values.
fn read_numeric_element<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    class: ClassKind,
    expected: usize,
) -> Result<NumericBuffer> {
    let (tag, small) = read_tag(r, endian)?;
    let count = element_count(&tag)?;
    if count != expected {
        return Err(MatError::invalid(format!(
            "element holds {count} values, dimensions require {expected}"
        )));
    }
    let buf = slab::read_numeric(r, endian, tag.data_type, class, count)?;
    stream::skip(r, payload_padding(&tag, small))?;
    Ok(buf)
}

/// Reads a char element, keeping the stored code-unit width.
fn read_char_element<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    expected: usize,
) -> Result<(DataKind, CharData)> {
    let (tag, small) = read_tag(r, endian)?;
    let count = element_count(&tag)?;
    if count != expected {
        return Err(MatError::invalid(format!(
            "char element holds {count} units, dimensions require {expected}"
        )));
    }
    let data = slab::read_char_units(r, endian, tag.data_type, count)?;
    stream::skip(r, payload_padding(&tag, small))?;
    Ok((tag.data_type, data))
}

/// Reads an integer element (dimensions, sparse indices) whose
/// length comes from its own tag.
fn read_index_element<R: Read + Seek>(r: &mut R, endian: Endian) -> Result<Vec<i32>> {
    let (tag, small) = read_tag(r, endian)?;
    let count = element_count(&tag)?;
    let values = slab::read_index_values(r, endian, tag.data_type, count)?;
    stream::skip(r, payload_padding(&tag, small))?;
    Ok(values)
}

/// Reads a floating element (sparse values) whose length comes from
/// its own tag.
fn read_f64_element<R: Read + Seek>(r: &mut R, endian: Endian) -> Result<Vec<f64>> {
    let (tag, small) = read_tag(r, endian)?;
    let count = element_count(&tag)?;
    let buf = slab::read_numeric(r, endian, tag.data_type, ClassKind::Double, count)?;
    stream::skip(r, payload_padding(&tag, small))?;
    match buf {
        NumericBuffer::F64(values) => Ok(values),
        _ => unreachable!("Double reads produce f64 buffers"),
    }
}

fn element_count(tag: &ElementTag) -> Result<usize> {
    let esize = tag.data_type.size_of();
    if esize == 0 {
        return Err(MatError::invalid(format!(
            "data type {:?} inside an array payload",
            tag.data_type
        )));
    }
    if tag.num_bytes as usize % esize != 0 {
        return Err(MatError::invalid("element size is not a whole element count"));
    }
    Ok(tag.num_bytes as usize / esize)
}

/// Parses the three header sub-elements of a miMATRIX (array flags,
/// dimensions, name), returning the header-only node and the nzmax
/// word.
fn read_matrix_header<R: Read + Seek>(r: &mut R, endian: Endian) -> Result<(MatVar, usize)> {
    let (kind, flag_bytes) = read_element_bytes(r, endian)?;
    if !matches!(kind, DataKind::UInt32 | DataKind::Int32) || flag_bytes.len() < 8 {
        return Err(MatError::invalid("bad array-flags element"));
    }
    let word = endian.read_u32_from(&flag_bytes[..4]);
    let nzmax = endian.read_u32_from(&flag_bytes[4..8]) as usize;
    let (class, flags) = unpack_array_flags(word);
    if let ClassKind::Unknown(code) = class {
        return Err(MatError::invalid(format!("unknown class code {code}")));
    }

    let (dim_kind, dim_bytes) = read_element_bytes(r, endian)?;
    let esize = dim_kind.size_of();
    if esize == 0 || dim_bytes.len() % esize != 0 {
        return Err(MatError::invalid("bad dimensions element"));
    }
    let raw_dims = slab::read_index_values(
        &mut Cursor::new(&dim_bytes[..]),
        endian,
        dim_kind,
        dim_bytes.len() / esize,
    )?;
    if raw_dims.is_empty() {
        return Err(MatError::invalid("variable has rank 0"));
    }
    let mut dims = Vec::with_capacity(raw_dims.len());
    for d in raw_dims {
        if d < 0 {
            return Err(MatError::invalid("negative dimension"));
        }
        dims.push(d as usize);
    }
    dim_product(&dims)?;

    let (_, name_bytes) = read_element_bytes(r, endian)?;
    let name = String::from_utf8_lossy(
        name_bytes.split(|&b| b == 0).next().unwrap_or(&name_bytes),
    )
    .into_owned();

    let var = MatVar {
        name,
        class,
        data_type: class.default_data_type(),
        dims,
        complex: flags.contains(ArrayFlags::COMPLEX),
        logical: flags.contains(ArrayFlags::LOGICAL),
        global: flags.contains(ArrayFlags::GLOBAL),
        payload: Payload::None,
        data_offset: None,
    };
    Ok((var, nzmax))
}

/// Reads one complete miMATRIX element, tag included, recursing
/// into cell and struct children.
fn read_matrix<R: Read + Seek>(r: &mut R, endian: Endian, diag: &mut Diagnostics) -> Result<MatVar> {
    let start = stream::tell(r)?;
    let (tag, small) = read_tag(r, endian)?;
    if tag.data_type != DataKind::Matrix {
        return Err(MatError::invalid(format!(
            "expected a matrix element, found {:?}",
            tag.data_type
        )));
    }
    if tag.num_bytes == 0 {
        // an unset cell or struct slot
        if small {
            stream::skip(r, u64::from(v5::SMALL_ELEMENT_MAX))?;
        }
        return Ok(MatVar::empty());
    }
    let end = start + tag.occupied();
    let var = read_matrix_body(r, endian, diag)?;
    r.seek(SeekFrom::Start(end))?;
    Ok(var)
}

fn read_matrix_body<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    diag: &mut Diagnostics,
) -> Result<MatVar> {
    let (mut var, nzmax) = read_matrix_header(r, endian)?;
    let n = dim_product(&var.dims)?;

    match var.class {
        class if class.is_numeric() => {
            let re = read_numeric_element(r, endian, class, n)?;
            let im = if var.complex {
                Some(read_numeric_element(r, endian, class, n)?)
            } else {
                None
            };
            var.data_type = class.default_data_type();
            var.payload = Payload::Numeric(NumericData { re, im });
        }
        ClassKind::Char => {
            let (disk, data) = read_char_element(r, endian, n)?;
            var.data_type = if ClassKind::Char.compatible_with(disk) {
                disk
            } else {
                data.data_kind()
            };
            var.payload = Payload::Char(data);
        }
        ClassKind::Sparse => {
            let mut ir = read_index_element(r, endian)?;
            let jc = read_index_element(r, endian)?;
            let ndata = jc.last().copied().unwrap_or(0);
            if ndata < 0 {
                return Err(MatError::invalid("negative sparse data count"));
            }
            let ndata = ndata as usize;
            if ir.len() < ndata {
                return Err(MatError::invalid("sparse row indices shorter than jc claims"));
            }
            // files may pad ir and the data out to nzmax
            ir.truncate(ndata);
            let values = if var.logical {
                skip_element(r, endian)?;
                var.data_type = DataKind::UInt8;
                SparseValues::Logical(vec![true; ndata])
            } else {
                let mut re = read_f64_element(r, endian)?;
                if re.len() < ndata {
                    return Err(MatError::invalid("sparse data shorter than jc claims"));
                }
                re.truncate(ndata);
                var.data_type = DataKind::Double;
                if var.complex {
                    let mut im = read_f64_element(r, endian)?;
                    if im.len() < ndata {
                        return Err(MatError::invalid("sparse data shorter than jc claims"));
                    }
                    im.truncate(ndata);
                    SparseValues::Complex { re, im }
                } else {
                    SparseValues::Real(re)
                }
            };
            let data = SparseData {
                nzmax: nzmax.max(ndata),
                ir,
                jc,
                values,
            };
            data.validate(&var.dims)?;
            var.payload = Payload::Sparse(data);
        }
        ClassKind::Cell => {
            let mut children = Vec::new();
            children.try_reserve_exact(n)?;
            for _ in 0..n {
                children.push(read_matrix(r, endian, diag)?);
            }
            var.payload = Payload::Cell(children);
        }
        ClassKind::Struct => {
            let lengths = read_index_element(r, endian)?;
            let fnlen = match lengths.first() {
                Some(&len) if len > 0 => len as usize,
                _ => return Err(MatError::invalid("bad struct field-name length")),
            };
            let (_, name_block) = read_element_bytes(r, endian)?;
            if name_block.len() % fnlen != 0 {
                return Err(MatError::invalid("struct field-name block is ragged"));
            }
            let nfields = name_block.len() / fnlen;
            let mut fields = Vec::with_capacity(nfields);
            for chunk in name_block.chunks_exact(fnlen) {
                let name = String::from_utf8_lossy(
                    chunk.split(|&b| b == 0).next().unwrap_or(chunk),
                )
                .into_owned();
                if fields.contains(&name) {
                    return Err(MatError::invalid(format!(
                        "duplicate struct field name {name:?}"
                    )));
                }
                fields.push(name);
            }
            let total = nfields
                .checked_mul(n)
                .ok_or_else(|| MatError::invalid("struct child count overflows"))?;
            let mut children = Vec::new();
            children.try_reserve_exact(total)?;
            for i in 0..total {
                let mut child = read_matrix(r, endian, diag)?;
                child.name = fields[i % nfields].clone();
                children.push(child);
            }
            var.payload = Payload::Struct(StructData { fields, children });
        }
        ClassKind::Function | ClassKind::Object | ClassKind::Opaque | ClassKind::Empty => {
            diag.warn(format!(
                "not reading payload of {:?} variable {:?}",
                var.class, var.name
            ));
            // the caller seeks past the element using its tag
        }
        _ => unreachable!("read_matrix_header rejects unknown classes"),
    }
    Ok(var)
}

/// Inflates a miCOMPRESSED payload of `nbytes` into memory.
fn inflate_element<R: Read>(r: &mut R, nbytes: u64) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new((&mut *r).take(nbytes));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MatError::Compression(e.to_string()))?;
    Ok(out)
}

/// Reads the next top-level variable header. Uncompressed variables
/// come back payload-free with their element offset recorded for
/// [read_data5]; compressed variables are inflated and arrive fully
/// loaded. Returns `None` at end of file.
pub(crate) fn read_next_info5<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    diag: &mut Diagnostics,
) -> Result<Option<MatVar>> {
    // realign: compressed elements from some writers are unpadded
    let pos = stream::tell(r)?;
    let start = pad8(pos);
    if start != pos {
        r.seek(SeekFrom::Start(start))?;
    }

    let mut word = [0u8; 4];
    match r.read_exact(&mut word) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let first = endian.read_u32_from(&word);
    let tag = match ElementTag::from_first_word(first) {
        Some(tag) => tag,
        None => {
            let num_bytes = endian.read_u32(r)?;
            ElementTag::new(DataKind::from(first), num_bytes)
        }
    };

    match tag.data_type {
        DataKind::Matrix => {
            if tag.num_bytes == 0 {
                let mut var = MatVar::empty();
                var.data_offset = Some(start);
                r.seek(SeekFrom::Start(start + tag.occupied()))?;
                return Ok(Some(var));
            }
            let (mut var, _) = read_matrix_header(r, endian)?;
            var.data_offset = Some(start);
            r.seek(SeekFrom::Start(start + tag.occupied()))?;
            Ok(Some(var))
        }
        DataKind::Compressed => {
            let inflated = inflate_element(r, u64::from(tag.num_bytes))?;
            r.seek(SeekFrom::Start(start + 8 + u64::from(tag.num_bytes)))?;
            let mut cursor = Cursor::new(inflated);
            let var = read_matrix(&mut cursor, endian, diag)?;
            Ok(Some(var))
        }
        other => Err(MatError::invalid(format!(
            "unexpected top-level element {other:?}"
        ))),
    }
}

/// Loads the payload of a header returned by [read_next_info5].
/// Variables that arrived from a compressed element already carry
/// their payload and are left untouched.
pub(crate) fn read_data5<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    diag: &mut Diagnostics,
    var: &mut MatVar,
) -> Result<()> {
    if var.has_data() {
        return Ok(());
    }
    // classes whose payload is never parsed stay payload-free
    if matches!(
        var.class,
        ClassKind::Function | ClassKind::Object | ClassKind::Opaque | ClassKind::Empty
    ) {
        return Ok(());
    }
    let offset = var
        .data_offset
        .ok_or_else(|| MatError::invalid("variable has no recorded data position"))?;
    r.seek(SeekFrom::Start(offset))?;
    let mut full = read_matrix(r, endian, diag)?;
    full.data_offset = var.data_offset;
    *var = full;
    Ok(())
}

/// Walks a miMATRIX element at `offset` to its real-part data
/// element, for slab reads that skip the payload load: returns the
/// data start, the on-disk kind, and the position of the element
/// that follows (the imaginary part, when the variable is complex).
pub(crate) fn numeric_data_positions<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    offset: u64,
) -> Result<(u64, DataKind, Option<u64>)> {
    r.seek(SeekFrom::Start(offset))?;
    let (tag, small) = read_tag(r, endian)?;
    if small || tag.data_type != DataKind::Matrix {
        return Err(MatError::invalid("expected a matrix element"));
    }
    let (var, _) = read_matrix_header(r, endian)?;
    if !var.class.is_numeric() {
        return Err(MatError::invalid(format!(
            "slab reads need a dense numeric variable, not {:?}",
            var.class
        )));
    }
    let data_tag_pos = stream::tell(r)?;
    let (data_tag, data_small) = read_tag(r, endian)?;
    if data_tag.data_type.size_of() == 0 {
        return Err(MatError::invalid(format!(
            "data type {:?} inside an array payload",
            data_tag.data_type
        )));
    }
    let base = stream::tell(r)?;
    let next = data_tag_pos
        + if data_small {
            v5::ELEMENT_ALIGN
        } else {
            v5::ELEMENT_ALIGN + pad8(u64::from(data_tag.num_bytes))
        };
    Ok((base, data_tag.data_type, Some(next)))
}

/// Position and kind of one numeric element's payload, given the
/// position of its tag.
pub(crate) fn numeric_element_position<R: Read + Seek>(
    r: &mut R,
    endian: Endian,
    pos: u64,
) -> Result<(u64, DataKind)> {
    r.seek(SeekFrom::Start(pos))?;
    let (tag, _) = read_tag(r, endian)?;
    if tag.data_type.size_of() == 0 {
        return Err(MatError::invalid(format!(
            "data type {:?} inside an array payload",
            tag.data_type
        )));
    }
    Ok((stream::tell(r)?, tag.data_type))
}

// ---- writing ----

fn element_occupied(nbytes: u64) -> u64 {
    if (1..=u64::from(v5::SMALL_ELEMENT_MAX)).contains(&nbytes) {
        v5::ELEMENT_ALIGN
    } else {
        v5::ELEMENT_ALIGN + pad8(nbytes)
    }
}

/// Field-name slot width for one struct node: the fixed default,
/// widened when a name plus its NUL terminator does not fit.
fn struct_field_slot(s: &StructData) -> usize {
    let longest = s.fields.iter().map(String::len).max().unwrap_or(0);
    if longest < v5::FIELD_NAME_LENGTH {
        v5::FIELD_NAME_LENGTH
    } else {
        pad8(longest as u64 + 1) as usize
    }
}

fn numeric_subelement_size(buf: &NumericBuffer) -> u64 {
    element_occupied(buf.len() as u64 * buf.data_kind().size_of() as u64)
}

/// Bytes of one serialized miMATRIX element (tag included) for a
/// node written under `name`.
fn matrix_size(var: &MatVar, name: &str) -> Result<u64> {
    let mut size = 8u64; // the miMATRIX tag itself
    size += 16; // array flags
    size += element_occupied(4 * var.rank() as u64);
    size += element_occupied(name.len() as u64);
    match &var.payload {
        Payload::None => return Err(MatError::invalid("variable data has not been read")),
        Payload::Numeric(data) => {
            size += numeric_subelement_size(&data.re);
            if let Some(im) = &data.im {
                size += numeric_subelement_size(im);
            }
        }
        Payload::Char(data) => {
            size += element_occupied(data.len() as u64 * data.data_kind().size_of() as u64);
        }
        Payload::Sparse(data) => {
            size += element_occupied(data.ir.len() as u64 * 4);
            size += element_occupied(data.jc.len() as u64 * 4);
            let ndata = data.values.len() as u64;
            match &data.values {
                SparseValues::Real(_) => size += element_occupied(ndata * 8),
                SparseValues::Complex { .. } => size += 2 * element_occupied(ndata * 8),
                SparseValues::Logical(_) => size += element_occupied(ndata),
            }
        }
        Payload::Cell(children) => {
            for child in children {
                size += matrix_size(child, "")?;
            }
        }
        Payload::Struct(s) => {
            let slot = struct_field_slot(s);
            size += element_occupied(4);
            size += element_occupied((s.fields.len() * slot) as u64);
            for child in &s.children {
                size += matrix_size(child, "")?;
            }
        }
    }
    Ok(size)
}

/// Writes a tag, choosing the compact form when the payload fits.
/// Returns whether the compact form was used.
fn write_tag<W: Write>(w: &mut W, kind: DataKind, nbytes: u32) -> Result<bool> {
    let tag = ElementTag::new(kind, nbytes);
    if tag.is_small() {
        w.write_u32::<LittleEndian>(tag.to_small_word())?;
        Ok(true)
    } else {
        w.write_u32::<LittleEndian>(u32::from(kind))?;
        w.write_u32::<LittleEndian>(nbytes)?;
        Ok(false)
    }
}

/// Writes the zero padding that closes an element.
fn finish_element<W: Write>(w: &mut W, nbytes: u32, small: bool) -> Result<()> {
    let pad = if small {
        u64::from(v5::SMALL_ELEMENT_MAX - nbytes)
    } else {
        padding_for(u64::from(nbytes))
    };
    stream::write_zeros(w, pad)?;
    Ok(())
}

fn write_bytes_element<W: Write>(w: &mut W, kind: DataKind, data: &[u8]) -> Result<()> {
    let nbytes = element_len_u32(data.len())?;
    let small = write_tag(w, kind, nbytes)?;
    w.write_all(data)?;
    finish_element(w, nbytes, small)
}

fn write_numeric_subelement<W: Write>(w: &mut W, buf: &NumericBuffer) -> Result<()> {
    let nbytes = element_len_u32(buf.len() * buf.data_kind().size_of())?;
    let small = write_tag(w, buf.data_kind(), nbytes)?;
    slab::write_buffer(w, buf)?;
    finish_element(w, nbytes, small)
}

fn write_i32_element<W: Write>(w: &mut W, kind: DataKind, values: &[i32]) -> Result<()> {
    let nbytes = element_len_u32(values.len() * 4)?;
    let small = write_tag(w, kind, nbytes)?;
    for &v in values {
        w.write_i32::<LittleEndian>(v)?;
    }
    finish_element(w, nbytes, small)
}

fn element_len_u32(nbytes: usize) -> Result<u32> {
    u32::try_from(nbytes).map_err(|_| MatError::invalid("element exceeds the v5 size limit"))
}

/// Writes one miMATRIX element for `var` under `name` (children are
/// written with empty names; struct children are named by the
/// field-name block instead).
fn write_matrix<W: Write>(w: &mut W, var: &MatVar, name: &str) -> Result<()> {
    let body = matrix_size(var, name)? - 8;
    w.write_u32::<LittleEndian>(u32::from(DataKind::Matrix))?;
    w.write_u32::<LittleEndian>(element_len_u32(body as usize)?)?;

    // array flags
    let mut flags = ArrayFlags::empty();
    flags.set(ArrayFlags::COMPLEX, var.complex);
    flags.set(ArrayFlags::GLOBAL, var.global);
    flags.set(ArrayFlags::LOGICAL, var.logical);
    let nzmax = match &var.payload {
        Payload::Sparse(data) => data.nzmax as u32,
        _ => 0,
    };
    write_tag(w, DataKind::UInt32, 8)?;
    w.write_u32::<LittleEndian>(pack_array_flags(var.class, flags))?;
    w.write_u32::<LittleEndian>(nzmax)?;

    // dimensions
    let dims: Vec<i32> = var.dims.iter().map(|&d| d as i32).collect();
    write_i32_element(w, DataKind::Int32, &dims)?;

    // name
    write_bytes_element(w, DataKind::Int8, name.as_bytes())?;

    match &var.payload {
        Payload::None => unreachable!("matrix_size rejects unloaded payloads"),
        Payload::Numeric(data) => {
            write_numeric_subelement(w, &data.re)?;
            if let Some(im) = &data.im {
                write_numeric_subelement(w, im)?;
            }
        }
        Payload::Char(data) => {
            let nbytes =
                element_len_u32(data.len() * data.data_kind().size_of())?;
            let small = write_tag(w, data.data_kind(), nbytes)?;
            slab::write_char(w, data)?;
            finish_element(w, nbytes, small)?;
        }
        Payload::Sparse(data) => {
            write_i32_element(w, DataKind::Int32, &data.ir)?;
            write_i32_element(w, DataKind::Int32, &data.jc)?;
            match &data.values {
                SparseValues::Real(re) => {
                    write_numeric_subelement(w, &NumericBuffer::F64(re.clone()))?
                }
                SparseValues::Complex { re, im } => {
                    write_numeric_subelement(w, &NumericBuffer::F64(re.clone()))?;
                    write_numeric_subelement(w, &NumericBuffer::F64(im.clone()))?;
                }
                SparseValues::Logical(values) => {
                    let bytes: Vec<u8> = values.iter().map(|&b| u8::from(b)).collect();
                    write_bytes_element(w, DataKind::UInt8, &bytes)?;
                }
            }
        }
        Payload::Cell(children) => {
            for child in children {
                write_matrix(w, child, "")?;
            }
        }
        Payload::Struct(s) => {
            let slot = struct_field_slot(s);
            write_i32_element(w, DataKind::UInt32, &[slot as i32])?;
            let mut block = vec![0u8; s.fields.len() * slot];
            for (i, field) in s.fields.iter().enumerate() {
                block[i * slot..i * slot + field.len()].copy_from_slice(field.as_bytes());
            }
            write_bytes_element(w, DataKind::Int8, &block)?;
            for child in &s.children {
                write_matrix(w, child, "")?;
            }
        }
    }
    Ok(())
}

/// Serializes one top-level variable, optionally wrapping it in a
/// miCOMPRESSED element. The compressed path writes a placeholder
/// length, streams the deflate output, then seeks back to patch the
/// tag once the stream is finished.
pub(crate) fn write_var5<W: Write + Seek>(w: &mut W, var: &MatVar, compress: bool) -> Result<()> {
    var.validate_for_write()?;
    if !compress {
        return write_matrix(w, var, &var.name);
    }

    let start = stream::tell(w)?;
    w.write_u32::<LittleEndian>(u32::from(DataKind::Compressed))?;
    w.write_u32::<LittleEndian>(0)?;
    let mut encoder = ZlibEncoder::new(&mut *w, flate2::Compression::default());
    write_matrix(&mut encoder, var, &var.name)?;
    encoder
        .finish()
        .map_err(|e| MatError::Compression(e.to_string()))?;

    let end = stream::tell(w)?;
    let nbytes = end - start - 8;
    stream::write_zeros(w, padding_for(nbytes))?;
    let after = stream::tell(w)?;
    w.seek(SeekFrom::Start(start + 4))?;
    w.write_u32::<LittleEndian>(element_len_u32(nbytes as usize)?)?;
    w.seek(SeekFrom::Start(after))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_one(var: &MatVar, compress: bool) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_var5(&mut cursor, var, compress).unwrap();
        cursor.into_inner()
    }

    fn read_one(bytes: Vec<u8>) -> MatVar {
        let mut diag = Diagnostics::new();
        let mut cursor = Cursor::new(bytes);
        let mut var = read_next_info5(&mut cursor, Endian::Little, &mut diag)
            .unwrap()
            .unwrap();
        read_data5(&mut cursor, Endian::Little, &mut diag, &mut var).unwrap();
        var
    }

    fn strip_offsets(mut var: MatVar) -> MatVar {
        var.data_offset = None;
        var
    }

    #[test]
    fn header_roundtrip() {
        let mut buf = Vec::new();
        write_header(&mut buf, Some("test file")).unwrap();
        assert_eq!(buf.len(), v5::HEADER_SIZE);
        let header = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header.endian, Endian::Little);
        assert_eq!(header.version, v5::HEADER_VERSION);
        assert_eq!(header.text, "test file");
    }

    #[test]
    fn header_rejects_v73() {
        let mut buf = Vec::new();
        write_header(&mut buf, None).unwrap();
        buf[124] = 0x00;
        buf[125] = 0x02;
        match read_header(&mut Cursor::new(buf)) {
            Err(MatError::UnsupportedVersion(0x0200)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn numeric_roundtrip() {
        let var = MatVar::numeric(
            "A",
            vec![2, 3],
            NumericData::real(NumericBuffer::I32(vec![1, 4, 2, 5, 3, 6])),
        )
        .unwrap();
        let bytes = write_one(&var, false);
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(strip_offsets(read_one(bytes)), var);
    }

    #[test]
    fn complex_single_roundtrip() {
        let var = MatVar::numeric(
            "z",
            vec![1, 2],
            NumericData::complex(
                NumericBuffer::F32(vec![1.5, 2.5]),
                NumericBuffer::F32(vec![-1.0, -2.0]),
            ),
        )
        .unwrap();
        assert_eq!(strip_offsets(read_one(write_one(&var, false))), var);
    }

    #[test]
    fn small_element_compact_form() {
        // one int32 fits a compact data element
        let var = MatVar::numeric(
            "n",
            vec![1, 1],
            NumericData::real(NumericBuffer::I32(vec![7])),
        )
        .unwrap();
        let bytes = write_one(&var, false);
        assert_eq!(strip_offsets(read_one(bytes.clone())), var);
        // after the matrix tag (8), flags (16), and dims (16) comes
        // the name "n": 1 byte, so a compact tag word
        let name_word = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(name_word >> 16, 1);
        assert_eq!(name_word & 0xffff, u32::from(DataKind::Int8));
        // the int32 data element is compact as well
        let data_word = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
        assert_eq!(data_word >> 16, 4);
        assert_eq!(data_word & 0xffff, u32::from(DataKind::Int32));
        assert_eq!(i32::from_le_bytes(bytes[52..56].try_into().unwrap()), 7);
    }

    #[test]
    fn empty_dims_use_full_tag() {
        let var = MatVar::numeric(
            "e",
            vec![0, 1],
            NumericData::real(NumericBuffer::F64(Vec::new())),
        )
        .unwrap();
        assert_eq!(strip_offsets(read_one(write_one(&var, false))), var);
    }

    #[test]
    fn char_utf16_roundtrip() {
        let var = MatVar::string("s", "héllo");
        assert_eq!(strip_offsets(read_one(write_one(&var, false))), var);
    }

    #[test]
    fn logical_roundtrip() {
        let var = MatVar::logical("b", vec![1, 4], vec![true, false, true, true]).unwrap();
        let back = read_one(write_one(&var, false));
        assert!(back.is_logical());
        assert_eq!(strip_offsets(back), var);
    }

    #[test]
    fn cell_roundtrip() {
        let mut var = MatVar::cell("c", vec![2, 1]).unwrap();
        var.set_cell(
            0,
            MatVar::numeric(
                "",
                vec![1, 2],
                NumericData::real(NumericBuffer::F64(vec![1.0, 2.0])),
            )
            .unwrap(),
        )
        .unwrap();
        var.set_cell(1, MatVar::string("", "xy")).unwrap();
        assert_eq!(strip_offsets(read_one(write_one(&var, false))), var);
    }

    #[test]
    fn struct_roundtrip_preserves_field_order() {
        let mut var =
            MatVar::structure("s", vec!["beta".into(), "alpha".into()], vec![1, 1]).unwrap();
        let mut a = MatVar::numeric(
            "",
            vec![1, 1],
            NumericData::real(NumericBuffer::F64(vec![3.5])),
        )
        .unwrap();
        a.set_name("beta");
        var.set_field(0, 0, a).unwrap();
        let mut b = MatVar::string("", "v");
        b.set_name("alpha");
        var.set_field(1, 0, b).unwrap();

        let back = read_one(write_one(&var, false));
        assert_eq!(back.fields(), ["beta", "alpha"]);
        assert_eq!(strip_offsets(back), var);
    }

    #[test]
    fn long_field_names_widen_the_slot() {
        let long = "a".repeat(40);
        let mut var = MatVar::structure("s", vec![long.clone()], vec![1, 1]).unwrap();
        let mut child = MatVar::numeric(
            "",
            vec![1, 1],
            NumericData::real(NumericBuffer::F64(vec![1.0])),
        )
        .unwrap();
        child.set_name(long.clone());
        var.set_field(0, 0, child).unwrap();
        let back = read_one(write_one(&var, false));
        assert_eq!(back.fields(), [long]);
    }

    #[test]
    fn sparse_roundtrip() {
        let var = MatVar::sparse(
            "sp",
            vec![4, 4],
            SparseData {
                nzmax: 3,
                ir: vec![0, 3, 2],
                jc: vec![0, 1, 2, 2, 3],
                values: SparseValues::Real(vec![1.0, 2.0, 3.0]),
            },
        )
        .unwrap();
        assert_eq!(strip_offsets(read_one(write_one(&var, false))), var);
    }

    #[test]
    fn sparse_logical_reads_all_true() {
        let var = MatVar::sparse(
            "lg",
            vec![4, 4],
            SparseData {
                nzmax: 3,
                ir: vec![0, 3, 2],
                jc: vec![0, 1, 1, 1, 3],
                values: SparseValues::Logical(vec![true, true, true]),
            },
        )
        .unwrap();
        let back = read_one(write_one(&var, true));
        assert!(back.is_logical());
        match back.payload() {
            Payload::Sparse(data) => {
                assert_eq!(data.values, SparseValues::Logical(vec![true; 3]));
                assert_eq!(data.jc, vec![0, 1, 1, 1, 3]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn compressed_roundtrip_and_tag_patch() {
        let var = MatVar::numeric(
            "big",
            vec![10, 10],
            NumericData::real(NumericBuffer::F64(vec![0.25; 100])),
        )
        .unwrap();
        let bytes = write_one(&var, true);
        assert_eq!(bytes.len() % 8, 0);
        let kind = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(DataKind::from(kind), DataKind::Compressed);
        let nbytes = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert!(nbytes > 0 && nbytes <= bytes.len() - 8);
        assert_eq!(strip_offsets(read_one(bytes)), var);
    }

    #[test]
    fn lazy_info_then_data() {
        let a = MatVar::numeric(
            "a",
            vec![1, 2],
            NumericData::real(NumericBuffer::F64(vec![1.0, 2.0])),
        )
        .unwrap();
        let b = MatVar::string("b", "ok");
        let mut cursor = Cursor::new(Vec::new());
        write_var5(&mut cursor, &a, false).unwrap();
        write_var5(&mut cursor, &b, false).unwrap();
        cursor.set_position(0);

        let mut diag = Diagnostics::new();
        let info_a = read_next_info5(&mut cursor, Endian::Little, &mut diag)
            .unwrap()
            .unwrap();
        assert_eq!(info_a.name(), "a");
        assert!(!info_a.has_data());
        let mut info_b = read_next_info5(&mut cursor, Endian::Little, &mut diag)
            .unwrap()
            .unwrap();
        assert_eq!(info_b.name(), "b");
        assert!(read_next_info5(&mut cursor, Endian::Little, &mut diag)
            .unwrap()
            .is_none());

        read_data5(&mut cursor, Endian::Little, &mut diag, &mut info_b).unwrap();
        assert_eq!(strip_offsets(info_b), b);
    }

    #[test]
    fn declared_sizes_match_consumed_bytes() {
        let mut var = MatVar::cell("c", vec![3, 1]).unwrap();
        var.set_cell(0, MatVar::string("", "abc")).unwrap();
        var.set_cell(
            1,
            MatVar::numeric(
                "",
                vec![2, 2],
                NumericData::real(NumericBuffer::I16(vec![1, 2, 3, 4])),
            )
            .unwrap(),
        )
        .unwrap();
        let bytes = write_one(&var, false);
        let declared = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), declared + 8);
        assert_eq!(bytes.len() % 8, 0);
    }
}
