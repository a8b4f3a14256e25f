// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading and writing MATLAB MAT-files, versions 4 and 5.
//!
//! The crate translates between an owned, dynamically typed variable
//! tree ([MatVar]: numbers, strings, logicals, sparse matrices,
//! cells, structs, nested arbitrarily) and the MAT binary formats,
//! with optional per-variable zlib compression in v5 files.
//!
//! # Reading
//!
//! [MatReader] detects the format version and byte order, then walks
//! variables in file order. Headers can be read without their
//! payloads ([MatReader::read_next_info]) and filled in later
//! ([MatReader::read_data]); dense numeric data supports strided
//! slab reads through the [slab] module.
//!
//! ```no_run
//! # fn main() -> matfile_core::Result<()> {
//! let mut reader = matfile_core::MatReader::open("results.mat")?;
//! while let Some(var) = reader.read_next()? {
//!     println!("{} {:?} {:?}", var.name(), var.class(), var.dims());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//!
//! [MatWriter] appends variables to a stream, either built directly
//! with the [MatVar] constructors or bridged from a [HostValue]
//! tree. Writing is append-only; a failed write leaves the file
//! intact up to [MatWriter::last_variable_end].
//!
//! # The host boundary
//!
//! [bridge] maps between [MatVar] and [HostValue], a model of the
//! dynamically typed values a binding layer works with: named lists
//! become structs, unnamed lists become cells, ragged lists become
//! cells of cells, and the reverse mappings restore those shapes.

pub mod bridge;
pub mod diag;
pub mod error;
mod mat4;
mod mat5;
pub mod session;
pub mod slab;
pub mod sparse;
mod stream;
pub mod var;

pub use bridge::{HostSparse, HostValue};
pub use diag::Diagnostics;
pub use error::{MatError, Result};
pub use session::{Compression, MatReader, MatVersion, MatWriter, VarInfo};
pub use sparse::{SparseData, SparseValues};
pub use stream::Endian;
pub use var::{CharData, MatVar, NumericBuffer, NumericData, Payload, StructData};

pub use matfile_types::{ArrayFlags, ClassKind, DataKind};
