// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types.

use matfile_types::ClassKind;
use std::collections::TryReserveError;
use thiserror::Error;

pub type Result<T, E = MatError> = std::result::Result<T, E>;

/// Error for any MAT reading, writing, or mapping operation.
#[derive(Debug, Error)]
pub enum MatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid MAT data: {0}")]
    InvalidMat(String),
    #[error("unsupported MAT version word {0:#06x}")]
    UnsupportedVersion(u16),
    #[error("unsupported variable class {0:?}")]
    UnsupportedClass(ClassKind),
    #[error("slab indices exceed array dimensions")]
    OutOfRange,
    #[error("cannot map host value: {0}")]
    ShapeMismatch(String),
    #[error("allocation refused: {0}")]
    Alloc(#[from] TryReserveError),
    #[error("compression error: {0}")]
    Compression(String),
}

impl MatError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMat(message.into())
    }

    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }
}
