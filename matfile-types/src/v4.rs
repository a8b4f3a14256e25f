// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The version 4 per-variable `MOPT` header integer.
//!
//! `MOPT = 1000*M + 100*O + 10*P + T`: machine byte order, a zero
//! digit, the data type, and the class. A value outside `0..=4052`
//! cannot be a valid MOPT in the reader's current byte order; the
//! reader byte-swaps and retries before giving up.

use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;

/// Largest integer a well-formed MOPT can decode to (`4052` =
/// M=4, O=0, P=5, T=2).
pub const MOPT_MAX: i32 = 4052;

/// Error decoding a MOPT integer.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MoptError {
    #[error("MOPT value {0} is out of range")]
    OutOfRange(i32),
    #[error("MOPT reserved digit is {0}, expected 0")]
    ReservedDigit(u8),
    #[error("unsupported machine byte order digit {0}")]
    ByteOrder(u8),
    #[error("unknown v4 data type digit {0}")]
    DataType(u8),
    #[error("unknown v4 class digit {0}")]
    Class(u8),
}

/// The `M` digit: byte order the record was written with.
///
/// Digits 2..=4 denote VAX and Cray orders, which no longer exist in
/// the wild and are rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum V4ByteOrder {
    LittleEndian = 0,
    BigEndian = 1,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// The `P` digit: element storage type of the record's data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum V4DataType {
    Double = 0,
    Single = 1,
    Int32 = 2,
    Int16 = 3,
    UInt16 = 4,
    UInt8 = 5,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// The `T` digit: what the record's matrix represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum V4Class {
    Numeric = 0,
    Char = 1,
    Sparse = 2,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// A decoded MOPT header integer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mopt {
    pub byte_order: V4ByteOrder,
    pub data_type: V4DataType,
    pub class: V4Class,
}

impl Mopt {
    /// Decodes a raw MOPT integer, already in the reader's byte
    /// order. Returns [MoptError::OutOfRange] when the value cannot
    /// be a MOPT at all, which is the caller's cue to byte-swap and
    /// retry.
    pub fn decode(raw: i32) -> Result<Self, MoptError> {
        if !(0..=MOPT_MAX).contains(&raw) {
            return Err(MoptError::OutOfRange(raw));
        }
        let m = (raw / 1000) as u8;
        let o = (raw / 100 % 10) as u8;
        let p = (raw / 10 % 10) as u8;
        let t = (raw % 10) as u8;
        if o != 0 {
            return Err(MoptError::ReservedDigit(o));
        }
        let byte_order = match V4ByteOrder::from(m) {
            V4ByteOrder::Unknown(d) => return Err(MoptError::ByteOrder(d)),
            order => order,
        };
        let data_type = match V4DataType::from(p) {
            V4DataType::Unknown(d) => return Err(MoptError::DataType(d)),
            dt => dt,
        };
        let class = match V4Class::from(t) {
            V4Class::Unknown(d) => return Err(MoptError::Class(d)),
            class => class,
        };
        Ok(Self {
            byte_order,
            data_type,
            class,
        })
    }

    pub fn encode(&self) -> i32 {
        u8::from(self.byte_order) as i32 * 1000
            + u8::from(self.data_type) as i32 * 10
            + u8::from(self.class) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_double() {
        let mopt = Mopt::decode(0).unwrap();
        assert_eq!(mopt.byte_order, V4ByteOrder::LittleEndian);
        assert_eq!(mopt.data_type, V4DataType::Double);
        assert_eq!(mopt.class, V4Class::Numeric);
    }

    #[test]
    fn decode_big_endian_sparse() {
        let mopt = Mopt::decode(1002).unwrap();
        assert_eq!(mopt.byte_order, V4ByteOrder::BigEndian);
        assert_eq!(mopt.class, V4Class::Sparse);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(Mopt::decode(-1), Err(MoptError::OutOfRange(-1)));
        assert_eq!(Mopt::decode(4053), Err(MoptError::OutOfRange(4053)));
    }

    #[test]
    fn rejects_reserved_digit() {
        assert_eq!(Mopt::decode(100), Err(MoptError::ReservedDigit(1)));
    }

    #[test]
    fn rejects_bad_digits() {
        assert_eq!(Mopt::decode(2000), Err(MoptError::ByteOrder(2)));
        assert_eq!(Mopt::decode(60), Err(MoptError::DataType(6)));
        assert_eq!(Mopt::decode(3), Err(MoptError::Class(3)));
    }

    #[test]
    fn encode_inverts_decode() {
        for raw in [0, 11, 1002, 52, 1041] {
            assert_eq!(Mopt::decode(raw).unwrap().encode(), raw);
        }
    }
}
