// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading and writing sessions.
//!
//! A [MatReader] wraps any `Read + Seek` stream, detects the file
//! version (a v5 header opens with the ASCII text `MATLAB`; a v4
//! file opens with a MOPT integer) and byte order, and walks the
//! variables in file order. A [MatWriter] appends variables to a
//! `Write + Seek` stream, one record or element per call. Sessions
//! are single-threaded and share nothing.

use crate::bridge::{self, HostValue};
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::stream::{self, Endian};
use crate::var::MatVar;
use crate::{mat4, mat5};
use matfile_types::{v5, ClassKind};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// On-disk MAT format version.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatVersion {
    V4,
    V5,
}

/// Per-variable compression for v5 files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Zlib,
}

/// Summary of one variable, as collected by [MatReader::variables].
#[derive(Clone, Debug)]
pub struct VarInfo {
    pub name: String,
    pub class: ClassKind,
    pub dims: Vec<usize>,
    pub complex: bool,
    pub logical: bool,
}

/// A reading session over one MAT file.
#[derive(Debug)]
pub struct MatReader<R> {
    stream: R,
    version: MatVersion,
    endian: Endian,
    header_text: Option<String>,
    data_start: u64,
    diag: Diagnostics,
}

impl MatReader<BufReader<File>> {
    /// Opens a file for reading with a buffered stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> MatReader<R> {
    /// Wraps a seekable stream, detecting format version and byte
    /// order from its head.
    pub fn from_reader(mut stream: R) -> Result<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let mut prefix = [0u8; 6];
        let mut filled = 0;
        while filled < prefix.len() {
            match stream.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        stream.seek(SeekFrom::Start(0))?;

        if filled == prefix.len() && &prefix == b"MATLAB" {
            let header = mat5::read_header(&mut stream)?;
            Ok(Self {
                stream,
                version: MatVersion::V5,
                endian: header.endian,
                header_text: Some(header.text),
                data_start: v5::HEADER_SIZE as u64,
                diag: Diagnostics::new(),
            })
        } else {
            // v4: the byte order is recovered per record from MOPT
            Ok(Self {
                stream,
                version: MatVersion::V4,
                endian: Endian::Little,
                header_text: None,
                data_start: 0,
                diag: Diagnostics::new(),
            })
        }
    }

    pub fn version(&self) -> MatVersion {
        self.version
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The v5 header description text.
    pub fn header_text(&self) -> Option<&str> {
        self.header_text.as_deref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Seeks back to the first variable.
    pub fn rewind(&mut self) -> Result<()> {
        self.stream.seek(SeekFrom::Start(self.data_start))?;
        Ok(())
    }

    /// Reads the next variable's header, leaving the payload
    /// unloaded where the format allows (compressed v5 variables
    /// arrive fully loaded). Returns `None` at end of file.
    pub fn read_next_info(&mut self) -> Result<Option<MatVar>> {
        match self.version {
            MatVersion::V5 => mat5::read_next_info5(&mut self.stream, self.endian, &mut self.diag),
            MatVersion::V4 => match mat4::read_next_info4(&mut self.stream)? {
                Some((var, endian)) => {
                    self.endian = endian;
                    Ok(Some(var))
                }
                None => Ok(None),
            },
        }
    }

    /// Loads the payload of a header returned by
    /// [Self::read_next_info]. The enumeration position is
    /// preserved, so interleaving with further `read_next_info`
    /// calls is fine.
    pub fn read_data(&mut self, var: &mut MatVar) -> Result<()> {
        let saved = stream::tell(&mut self.stream)?;
        let result = match self.version {
            MatVersion::V5 => {
                mat5::read_data5(&mut self.stream, self.endian, &mut self.diag, var)
            }
            MatVersion::V4 => {
                if var.has_data() {
                    Ok(())
                } else {
                    mat4::read_data4(&mut self.stream, self.endian, var)
                }
            }
        };
        self.stream.seek(SeekFrom::Start(saved))?;
        result
    }

    /// Reads the next variable in full.
    pub fn read_next(&mut self) -> Result<Option<MatVar>> {
        match self.read_next_info()? {
            Some(mut var) => {
                self.read_data(&mut var)?;
                Ok(Some(var))
            }
            None => Ok(None),
        }
    }

    /// Reads the next variable and maps it to a host value.
    pub fn read_next_host(&mut self) -> Result<Option<(String, HostValue)>> {
        match self.read_next()? {
            Some(var) => {
                let value = bridge::to_host(&var, &mut self.diag)?;
                Ok(Some((var.name, value)))
            }
            None => Ok(None),
        }
    }

    /// Seeks to the variable called `name` and reads it in full.
    /// The session is left positioned after that variable.
    pub fn read_var(&mut self, name: &str) -> Result<Option<MatVar>> {
        self.rewind()?;
        while let Some(mut var) = self.read_next_info()? {
            if var.name() == name {
                self.read_data(&mut var)?;
                return Ok(Some(var));
            }
        }
        Ok(None)
    }

    /// Reads an N-D `(start, stride, edge)` slab of a dense numeric
    /// variable, without loading the whole payload. Variables whose
    /// payload is already in memory (compressed v5, or loaded via
    /// [Self::read_data]) are gathered from it; others are read
    /// element-by-element from the stream.
    pub fn read_slab(
        &mut self,
        var: &MatVar,
        start: &[usize],
        stride: &[usize],
        edge: &[usize],
    ) -> Result<crate::var::NumericData> {
        use crate::var::{NumericData, Payload};

        if !var.class().is_numeric() {
            return Err(crate::MatError::invalid(format!(
                "slab reads need a dense numeric variable, not {:?}",
                var.class()
            )));
        }
        if let Payload::Numeric(data) = var.payload() {
            let re = crate::slab::gather_slab(&data.re, var.dims(), start, stride, edge)?;
            let im = match &data.im {
                Some(im) => Some(crate::slab::gather_slab(im, var.dims(), start, stride, edge)?),
                None => None,
            };
            return Ok(NumericData { re, im });
        }

        let saved = stream::tell(&mut self.stream)?;
        let result = self.read_slab_from_stream(var, start, stride, edge);
        self.stream.seek(SeekFrom::Start(saved))?;
        result
    }

    /// Reads a 1-D slab over the column-major flattening of a dense
    /// numeric variable.
    pub fn read_slab_linear(
        &mut self,
        var: &MatVar,
        start: usize,
        stride: usize,
        edge: usize,
    ) -> Result<crate::var::NumericData> {
        use crate::var::{NumericData, Payload};

        let nmemb = var.len();
        if let Payload::Numeric(data) = var.payload() {
            let re =
                crate::slab::gather_slab(&data.re, &[nmemb], &[start], &[stride], &[edge])?;
            let im = match &data.im {
                Some(im) => Some(crate::slab::gather_slab(
                    im,
                    &[nmemb],
                    &[start],
                    &[stride],
                    &[edge],
                )?),
                None => None,
            };
            return Ok(NumericData { re, im });
        }

        let saved = stream::tell(&mut self.stream)?;
        let result = self.read_slab_linear_from_stream(var, start, stride, edge);
        self.stream.seek(SeekFrom::Start(saved))?;
        result
    }

    fn read_slab_linear_from_stream(
        &mut self,
        var: &MatVar,
        start: usize,
        stride: usize,
        edge: usize,
    ) -> Result<crate::var::NumericData> {
        use crate::var::NumericData;

        let offset = var.data_offset.ok_or_else(|| {
            crate::MatError::invalid("variable has no recorded data position")
        })?;
        let nmemb = var.len();
        match self.version {
            MatVersion::V4 => {
                let esize = var.data_type().size_of() as u64;
                let re = crate::slab::read_slab_1d(
                    &mut self.stream,
                    self.endian,
                    var.data_type(),
                    ClassKind::Double,
                    offset,
                    nmemb,
                    start,
                    stride,
                    edge,
                )?;
                let im = if var.is_complex() {
                    Some(crate::slab::read_slab_1d(
                        &mut self.stream,
                        self.endian,
                        var.data_type(),
                        ClassKind::Double,
                        offset + nmemb as u64 * esize,
                        nmemb,
                        start,
                        stride,
                        edge,
                    )?)
                } else {
                    None
                };
                Ok(NumericData { re, im })
            }
            MatVersion::V5 => {
                let (re_base, re_kind, im_pos) =
                    mat5::numeric_data_positions(&mut self.stream, self.endian, offset)?;
                let re = crate::slab::read_slab_1d(
                    &mut self.stream,
                    self.endian,
                    re_kind,
                    var.class(),
                    re_base,
                    nmemb,
                    start,
                    stride,
                    edge,
                )?;
                let im = if var.is_complex() {
                    let pos = im_pos.ok_or_else(|| {
                        crate::MatError::invalid("complex variable without imaginary element")
                    })?;
                    let (im_base, im_kind) =
                        mat5::numeric_element_position(&mut self.stream, self.endian, pos)?;
                    Some(crate::slab::read_slab_1d(
                        &mut self.stream,
                        self.endian,
                        im_kind,
                        var.class(),
                        im_base,
                        nmemb,
                        start,
                        stride,
                        edge,
                    )?)
                } else {
                    None
                };
                Ok(NumericData { re, im })
            }
        }
    }

    fn read_slab_from_stream(
        &mut self,
        var: &MatVar,
        start: &[usize],
        stride: &[usize],
        edge: &[usize],
    ) -> Result<crate::var::NumericData> {
        use crate::var::NumericData;

        let offset = var.data_offset.ok_or_else(|| {
            crate::MatError::invalid("variable has no recorded data position")
        })?;
        let esize = var.data_type().size_of() as u64;
        match self.version {
            MatVersion::V4 => {
                let nmemb = var.len() as u64;
                let re = crate::slab::read_slab_nd(
                    &mut self.stream,
                    self.endian,
                    var.data_type(),
                    ClassKind::Double,
                    offset,
                    var.dims(),
                    start,
                    stride,
                    edge,
                )?;
                let im = if var.is_complex() {
                    Some(crate::slab::read_slab_nd(
                        &mut self.stream,
                        self.endian,
                        var.data_type(),
                        ClassKind::Double,
                        offset + nmemb * esize,
                        var.dims(),
                        start,
                        stride,
                        edge,
                    )?)
                } else {
                    None
                };
                Ok(NumericData { re, im })
            }
            MatVersion::V5 => {
                let (re_base, re_kind, im_pos) =
                    mat5::numeric_data_positions(&mut self.stream, self.endian, offset)?;
                let re = crate::slab::read_slab_nd(
                    &mut self.stream,
                    self.endian,
                    re_kind,
                    var.class(),
                    re_base,
                    var.dims(),
                    start,
                    stride,
                    edge,
                )?;
                let im = if var.is_complex() {
                    let pos = im_pos.ok_or_else(|| {
                        crate::MatError::invalid("complex variable without imaginary element")
                    })?;
                    let (im_base, im_kind) =
                        mat5::numeric_element_position(&mut self.stream, self.endian, pos)?;
                    Some(crate::slab::read_slab_nd(
                        &mut self.stream,
                        self.endian,
                        im_kind,
                        var.class(),
                        im_base,
                        var.dims(),
                        start,
                        stride,
                        edge,
                    )?)
                } else {
                    None
                };
                Ok(NumericData { re, im })
            }
        }
    }

    /// Enumerates every variable's header. The current position is
    /// restored afterwards.
    pub fn variables(&mut self) -> Result<Vec<VarInfo>> {
        let saved = stream::tell(&mut self.stream)?;
        self.rewind()?;
        let mut out = Vec::new();
        while let Some(var) = self.read_next_info()? {
            out.push(VarInfo {
                name: var.name().to_string(),
                class: var.class(),
                dims: var.dims().to_vec(),
                complex: var.is_complex(),
                logical: var.is_logical(),
            });
        }
        self.stream.seek(SeekFrom::Start(saved))?;
        Ok(out)
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

/// A writing session. Variables are appended in call order; there
/// is no in-place update of written variables.
#[derive(Debug)]
pub struct MatWriter<W> {
    stream: W,
    version: MatVersion,
    compression: Compression,
    last_end: u64,
}

impl MatWriter<File> {
    /// Creates (truncating) a file and writes the v5 header when the
    /// version asks for one.
    pub fn create<P: AsRef<Path>>(
        path: P,
        version: MatVersion,
        description: Option<&str>,
        compression: Compression,
    ) -> Result<Self> {
        Self::from_writer(File::create(path)?, version, description, compression)
    }
}

impl<W: Write + Seek> MatWriter<W> {
    /// Starts a session on a stream positioned at its beginning.
    pub fn from_writer(
        mut stream: W,
        version: MatVersion,
        description: Option<&str>,
        compression: Compression,
    ) -> Result<Self> {
        if version == MatVersion::V5 {
            mat5::write_header(&mut stream, description)?;
        }
        let last_end = stream::tell(&mut stream)?;
        Ok(Self {
            stream,
            version,
            compression,
            last_end,
        })
    }

    pub fn version(&self) -> MatVersion {
        self.version
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// End of the last successfully written variable. After a failed
    /// write the stream may extend past this; callers deciding to
    /// keep the file can truncate to it.
    pub fn last_variable_end(&self) -> u64 {
        self.last_end
    }

    /// Writes one variable with the session's default compression.
    pub fn write(&mut self, var: &MatVar) -> Result<()> {
        self.write_with(var, self.compression)
    }

    /// Writes one variable, overriding the session default.
    pub fn write_with(&mut self, var: &MatVar, compression: Compression) -> Result<()> {
        match self.version {
            MatVersion::V4 => {
                if compression == Compression::Zlib {
                    log::debug!(
                        "v4 files have no compression; writing {:?} uncompressed",
                        var.name()
                    );
                }
                mat4::write_var4(&mut self.stream, var)?;
            }
            MatVersion::V5 => {
                mat5::write_var5(&mut self.stream, var, compression == Compression::Zlib)?;
            }
        }
        self.last_end = stream::tell(&mut self.stream)?;
        Ok(())
    }

    /// Bridges a host value and writes it under `name`.
    pub fn write_host(&mut self, name: &str, value: &HostValue) -> Result<()> {
        let var = bridge::to_matvar(name, value)?;
        self.write(&var)
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}
