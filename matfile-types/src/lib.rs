// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! MATLAB MAT-file data structures, constants, and enumerations.
//!
//! This crate defines the on-disk primitives shared by MAT version 4
//! and version 5 files: the class and data-type code spaces, the
//! array-flags word, the version 4 `MOPT` header integer, and the
//! version 5 element-tag framing rules.
//!
//! # Minimal by Design
//!
//! No I/O happens here. The crate only models values that appear in
//! the file format so that readers, writers, and tooling can share
//! one set of definitions. Byte-order handling, stream framing, and
//! the in-memory variable tree live in `matfile-core`.
//!
//! # Typing Variations from MATLAB's Definitions
//!
//! The reference C definitions use bare integer constants for class
//! codes, data-type codes, and flag masks. Related constants are
//! combined into Rust enums ([ClassKind], [DataKind], the `v4` MOPT
//! digits), each carrying a `catch_all` variant so that codes from a
//! malformed or future file are representable without being valid.
//! Flag masks become a `bitflags` struct ([flags::ArrayFlags]).
//!
//! Distinguishing [ClassKind] (what a variable *is*: double matrix,
//! cell array, structure) from [DataKind] (how numeric elements are
//! *stored*: int8, uint16, IEEE double) is the central typing split
//! of the format. A double-class array may be stored on disk as
//! int16 when every value fits; readers convert on load.

pub mod class;
pub mod data;
pub mod flags;
pub mod v4;
pub mod v5;

pub use class::ClassKind;
pub use data::DataKind;
pub use flags::ArrayFlags;
