// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Variable class codes.

use crate::data::DataKind;
use num_enum::{FromPrimitive, IntoPrimitive};

/// The semantic class of a MAT variable.
///
/// The discriminants are the version 5 on-disk class codes carried in
/// the low byte of the array-flags word. Version 4 files use a
/// different encoding (see [crate::v4]) that maps onto a subset of
/// these classes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ClassKind {
    Empty = 0,
    Cell = 1,
    Struct = 2,
    Object = 3,
    Char = 4,
    Sparse = 5,
    Double = 6,
    Single = 7,
    Int8 = 8,
    UInt8 = 9,
    Int16 = 10,
    UInt16 = 11,
    Int32 = 12,
    UInt32 = 13,
    Int64 = 14,
    UInt64 = 15,
    Function = 16,
    Opaque = 17,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl ClassKind {
    /// Whether the class is a regular numeric array class.
    ///
    /// Sparse is not numeric in this sense: its payload is the
    /// compressed-column triple, not a dense slab.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Double
                | Self::Single
                | Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
        )
    }

    /// The canonical on-disk data type for a freshly created variable
    /// of this class.
    ///
    /// Char maps to UTF-16, the encoding version 5 writers emit.
    pub fn default_data_type(self) -> DataKind {
        match self {
            Self::Double | Self::Sparse => DataKind::Double,
            Self::Single => DataKind::Single,
            Self::Int8 => DataKind::Int8,
            Self::UInt8 => DataKind::UInt8,
            Self::Int16 => DataKind::Int16,
            Self::UInt16 => DataKind::UInt16,
            Self::Int32 => DataKind::Int32,
            Self::UInt32 => DataKind::UInt32,
            Self::Int64 => DataKind::Int64,
            Self::UInt64 => DataKind::UInt64,
            Self::Char => DataKind::Utf16,
            Self::Cell => DataKind::Cell,
            Self::Struct => DataKind::Struct,
            _ => DataKind::Unknown(0),
        }
    }

    /// Whether `data_type` is an acceptable in-memory data type for a
    /// node of this class.
    pub fn compatible_with(self, data_type: DataKind) -> bool {
        match self {
            Self::Char => matches!(
                data_type,
                DataKind::Utf8
                    | DataKind::Utf16
                    | DataKind::Utf32
                    | DataKind::UInt8
                    | DataKind::UInt16
            ),
            Self::Sparse => matches!(data_type, DataKind::Double | DataKind::UInt8),
            Self::Cell => data_type == DataKind::Cell,
            Self::Struct => data_type == DataKind::Struct,
            _ if self.is_numeric() => data_type == self.default_data_type(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_codes() {
        assert_eq!(ClassKind::from(5u8), ClassKind::Sparse);
        assert_eq!(u8::from(ClassKind::Function), 16);
        assert_eq!(ClassKind::from(42u8), ClassKind::Unknown(42));
    }

    #[test]
    fn compatibility() {
        assert!(ClassKind::Double.compatible_with(DataKind::Double));
        assert!(!ClassKind::Double.compatible_with(DataKind::Int16));
        assert!(ClassKind::Char.compatible_with(DataKind::Utf16));
        assert!(ClassKind::Sparse.compatible_with(DataKind::UInt8));
        assert!(!ClassKind::Cell.compatible_with(DataKind::Double));
    }
}
