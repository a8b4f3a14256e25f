// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-stream and endian helpers.
//!
//! A session carries one [Endian] value detected from the file
//! header (v5) or the first MOPT integer (v4); every multibyte read
//! goes through it. Writes always emit little-endian, so the write
//! paths use the [Endian::Little] methods directly.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Byte order of multibyte values in a stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endian {
    Little,
    Big,
}

macro_rules! endian_method {
    ($read:ident, $get:ident, $write:ident, $ty:ty) => {
        pub fn $read<R: Read>(self, r: &mut R) -> io::Result<$ty> {
            match self {
                Self::Little => r.$read::<LittleEndian>(),
                Self::Big => r.$read::<BigEndian>(),
            }
        }

        /// Reads from the front of a byte slice.
        pub fn $get(self, buf: &[u8]) -> $ty {
            match self {
                Self::Little => <LittleEndian as ByteOrder>::$read(buf),
                Self::Big => <BigEndian as ByteOrder>::$read(buf),
            }
        }

        pub fn $write<W: Write>(self, w: &mut W, value: $ty) -> io::Result<()> {
            match self {
                Self::Little => w.$write::<LittleEndian>(value),
                Self::Big => w.$write::<BigEndian>(value),
            }
        }
    };
}

impl Endian {
    endian_method!(read_u16, read_u16_from, write_u16, u16);
    endian_method!(read_i16, read_i16_from, write_i16, i16);
    endian_method!(read_u32, read_u32_from, write_u32, u32);
    endian_method!(read_i32, read_i32_from, write_i32, i32);
    endian_method!(read_u64, read_u64_from, write_u64, u64);
    endian_method!(read_i64, read_i64_from, write_i64, i64);
    endian_method!(read_f32, read_f32_from, write_f32, f32);
    endian_method!(read_f64, read_f64_from, write_f64, f64);

    pub fn swapped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }
}

/// Current absolute stream position.
pub fn tell<S: Seek>(stream: &mut S) -> io::Result<u64> {
    stream.stream_position()
}

/// Skips `n` bytes forward, returning the new position.
pub fn skip<S: Seek>(stream: &mut S, n: u64) -> io::Result<u64> {
    stream.seek(SeekFrom::Current(n as i64))
}

/// Writes `n` zero bytes.
pub fn write_zeros<W: Write>(w: &mut W, n: u64) -> io::Result<()> {
    const ZEROS: [u8; 8] = [0; 8];
    let mut remaining = n;
    while remaining > 0 {
        let chunk = remaining.min(ZEROS.len() as u64) as usize;
        w.write_all(&ZEROS[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_both_orders() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(
            Endian::Little.read_u32(&mut Cursor::new(bytes)).unwrap(),
            0x0403_0201
        );
        assert_eq!(
            Endian::Big.read_u32(&mut Cursor::new(bytes)).unwrap(),
            0x0102_0304
        );
        assert_eq!(Endian::Little.read_u16_from(&bytes), 0x0201);
    }

    #[test]
    fn write_read_roundtrip() {
        let mut buf = Vec::new();
        Endian::Big.write_f64(&mut buf, -2.5).unwrap();
        assert_eq!(Endian::Big.read_f64_from(&buf), -2.5);
    }

    #[test]
    fn zero_fill() {
        let mut buf = Vec::new();
        write_zeros(&mut buf, 11).unwrap();
        assert_eq!(buf, vec![0u8; 11]);
    }
}
