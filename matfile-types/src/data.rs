// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! On-disk element data types.

use num_enum::{FromPrimitive, IntoPrimitive};

/// The storage type of a version 5 data element.
///
/// The discriminants are the `mi*` type codes written in element
/// tags. Codes 8, 10, 11, and 19 are reserved by the format and
/// surface as [DataKind::Unknown].
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DataKind {
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Single = 7,
    Double = 9,
    Int64 = 12,
    UInt64 = 13,
    /// A nested miMATRIX element.
    Matrix = 14,
    /// A deflate stream wrapping one miMATRIX element.
    Compressed = 15,
    Utf8 = 16,
    Utf16 = 17,
    Utf32 = 18,
    String = 20,
    Cell = 21,
    Struct = 22,
    #[num_enum(catch_all)]
    Unknown(u32),
}

impl DataKind {
    /// Size in bytes of one element of this type, or 0 for kinds that
    /// do not describe fixed-size scalars (Matrix, Compressed, ...).
    pub fn size_of(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::Utf8 => 1,
            Self::Int16 | Self::UInt16 | Self::Utf16 => 2,
            Self::Int32 | Self::UInt32 | Self::Single | Self::Utf32 => 4,
            Self::Double | Self::Int64 | Self::UInt64 => 8,
            _ => 0,
        }
    }

    /// Whether the kind describes fixed-size numeric scalars.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Single
                | Self::Double
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(DataKind::Double.size_of(), 8);
        assert_eq!(DataKind::Utf16.size_of(), 2);
        assert_eq!(DataKind::Matrix.size_of(), 0);
    }

    #[test]
    fn reserved_codes_are_unknown() {
        assert_eq!(DataKind::from(8u32), DataKind::Unknown(8));
        assert_eq!(DataKind::from(19u32), DataKind::Unknown(19));
        assert_eq!(DataKind::from(15u32), DataKind::Compressed);
    }
}
