// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The version 5 array-flags word.

use crate::class::ClassKind;
use bitflags::bitflags;

bitflags! {
    /// Flag bits carried in the second byte of the array-flags word.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ArrayFlags: u8 {
        const COMPLEX = 0x80;
        const GLOBAL = 0x40;
        const LOGICAL = 0x10;
    }
}

/// Packs a class code and flag byte into the first word of the
/// array-flags element: `class | flags << 8`, upper two bytes zero.
pub fn pack_array_flags(class: ClassKind, flags: ArrayFlags) -> u32 {
    u8::from(class) as u32 | (flags.bits() as u32) << 8
}

/// Splits the first word of an array-flags element back into its
/// class code and flag byte. Undefined flag bits are dropped.
pub fn unpack_array_flags(word: u32) -> (ClassKind, ArrayFlags) {
    let class = ClassKind::from((word & 0xff) as u8);
    let flags = ArrayFlags::from_bits_truncate((word >> 8) as u8);
    (class, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        let word = pack_array_flags(ClassKind::Sparse, ArrayFlags::COMPLEX | ArrayFlags::GLOBAL);
        assert_eq!(word, 5 | 0xc0 << 8);
        let (class, flags) = unpack_array_flags(word);
        assert_eq!(class, ClassKind::Sparse);
        assert!(flags.contains(ArrayFlags::COMPLEX));
        assert!(flags.contains(ArrayFlags::GLOBAL));
        assert!(!flags.contains(ArrayFlags::LOGICAL));
    }

    #[test]
    fn undefined_bits_dropped() {
        let (_, flags) = unpack_array_flags(6 | 0xff << 8);
        assert_eq!(flags, ArrayFlags::all());
    }
}
