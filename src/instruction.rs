// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operation sizes.

use std::fmt;

/// Size of an operation.
///
/// All values are handled in a 32-bits natural representation, and this type gives the width-correct masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Size {
    Byte = 1,
    Word = 2,
    Long = 4,
}

impl Size {
    /// Returns Word when self is Byte, self otherwise.
    ///
    /// This is used in addressing modes, where byte post/pre increment of A7
    /// moves the register by 2 instead of 1.
    #[inline(always)]
    pub const fn as_word_long(self) -> Self {
        match self {
            Self::Byte => Self::Word,
            _ => self,
        }
    }

    /// Creates a new size from a single size bit of the operand (like MOVEM and EXT).
    ///
    /// - 0 => Word
    /// - 1 => Long
    #[inline(always)]
    pub const fn from_bit(d: u16) -> Self {
        if d & 1 == 0 {
            Self::Word
        } else {
            Self::Long
        }
    }

    /// Creates a new size from the size bits of a MOVE or MOVEA instruction.
    ///
    /// - 1 => Byte
    /// - 3 => Word
    /// - 2 => Long
    #[inline(always)]
    pub const fn from_move(d: u16) -> Option<Self> {
        match d {
            1 => Some(Self::Byte),
            3 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    /// Creates a new size from the primary size bits (0 => Byte, 1 => Word, 2 => Long).
    #[inline(always)]
    pub const fn from_bits(d: u16) -> Option<Self> {
        match d {
            0 => Some(Self::Byte),
            1 => Some(Self::Word),
            2 => Some(Self::Long),
            _ => None,
        }
    }

    /// The number of bits of the size.
    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self as u32 * 8
    }

    /// The mask covering the value bits.
    #[inline(always)]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Long => 0xFFFF_FFFF,
        }
    }

    /// The mask of the most significant bit.
    #[inline(always)]
    pub const fn sign_bit(self) -> u32 {
        match self {
            Self::Byte => 0x80,
            Self::Word => 0x8000,
            Self::Long => 0x8000_0000,
        }
    }

    /// Returns true if the most significant bit of the value is set.
    #[inline(always)]
    pub const fn is_negative(self, value: u32) -> bool {
        value & self.sign_bit() != 0
    }

    /// Returns true if the value bits are all clear.
    #[inline(always)]
    pub const fn is_zero(self, value: u32) -> bool {
        value & self.mask() == 0
    }

    /// Sign-extends the value to 32 bits.
    #[inline(always)]
    pub const fn sign_extend(self, value: u32) -> u32 {
        match self {
            Self::Byte => value as u8 as i8 as i32 as u32,
            Self::Word => value as u16 as i16 as i32 as u32,
            Self::Long => value,
        }
    }

    /// Replaces the low bits of `dst` covered by the size by the ones of `value`.
    #[inline(always)]
    pub const fn merge(self, dst: u32, value: u32) -> u32 {
        dst & !self.mask() | value & self.mask()
    }

    /// Returns true if it is Size::Byte, false otherwise.
    #[inline(always)]
    pub fn is_byte(self) -> bool {
        self == Self::Byte
    }

    /// Returns true if it is Size::Word, false otherwise.
    #[inline(always)]
    pub fn is_word(self) -> bool {
        self == Self::Word
    }

    /// Returns true if it is Size::Long, false otherwise.
    #[inline(always)]
    pub fn is_long(self) -> bool {
        self == Self::Long
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "B"),
            Self::Word => write!(f, "W"),
            Self::Long => write!(f, "L"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_correct_tests() {
        assert!(Size::Byte.is_negative(0x80));
        assert!(!Size::Byte.is_negative(0x8000_0000));
        assert!(Size::Word.is_zero(0xFFFF_0000));
        assert!(!Size::Long.is_zero(0xFFFF_0000));
        assert_eq!(Size::Word.merge(0x1234_5678, 0xABCD), 0x1234_ABCD);
        assert_eq!(Size::Byte.sign_extend(0xF0), 0xFFFF_FFF0);
        assert_eq!(Size::Byte.as_word_long(), Size::Word);
    }
}
