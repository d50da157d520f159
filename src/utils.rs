// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utility traits and functions.

/// Checks if the given bit of the given data is set.
#[inline(always)]
pub const fn bit(data: u16, bit: u16) -> bool {
    data & (1 << bit) != 0
}

/// Returns bits `[beg, end]` inclusive, starting at 0.
#[inline(always)]
pub const fn bits(d: u16, beg: u16, end: u16) -> u16 {
    let mask = (1 << (end + 1 - beg)) - 1;
    d >> beg & mask
}

/// Sign-extends the low byte of the given value.
#[inline(always)]
pub const fn sign_extend_byte(d: u32) -> u32 {
    d as u8 as i8 as i32 as u32
}

/// Sign-extends the low word of the given value.
#[inline(always)]
pub const fn sign_extend_word(d: u32) -> u32 {
    d as u16 as i16 as i32 as u32
}

/// Trait to see if an address is even or not.
pub trait IsEven: Sized {
    fn is_even(self) -> bool;
}

impl IsEven for u32 {
    #[inline(always)]
    fn is_even(self) -> bool {
        self & 1 == 0
    }
}
