// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Condition code computation, shared by every instruction family.
//!
//! Each function takes the width of the operation, the result and the operands zero-extended to 32 bits,
//! and the mask of the CCR bits it is allowed to update. Bits outside of the mask keep their value.
//! The mask is the set of flags affected by the instruction, restricted to the flags that are live afterwards.

use crate::instruction::Size;
use crate::status_register::{Ccr, StatusRegister};

#[inline(always)]
fn write(sr: &mut StatusRegister, mask: Ccr, flag: Ccr, value: bool) {
    if mask.contains(flag) {
        sr.set_flag(flag, value);
    }
}

/// Flags of an addition `dst + src`. X is a copy of C.
#[inline(always)]
pub fn apply_add(sr: &mut StatusRegister, size: Size, res: u32, src: u32, dst: u32, mask: Ccr) {
    let m = size.mask();
    let (res, src, dst) = (res & m, src & m, dst & m);
    let c = (!dst & m) < src;

    write(sr, mask, Ccr::N, size.is_negative(res));
    write(sr, mask, Ccr::Z, res == 0);
    write(sr, mask, Ccr::V, size.is_negative((src ^ res) & (dst ^ res)));
    write(sr, mask, Ccr::C, c);
    write(sr, mask, Ccr::X, c);
}

/// Flags of a subtraction `dst - src`. X is a copy of C.
#[inline(always)]
pub fn apply_sub(sr: &mut StatusRegister, size: Size, res: u32, src: u32, dst: u32, mask: Ccr) {
    apply_cmp(sr, size, res, src, dst, mask);
    write(sr, mask, Ccr::X, src & size.mask() > dst & size.mask());
}

/// Flags of a comparison `dst - src`. X is not affected.
#[inline(always)]
pub fn apply_cmp(sr: &mut StatusRegister, size: Size, res: u32, src: u32, dst: u32, mask: Ccr) {
    let m = size.mask();
    let (res, src, dst) = (res & m, src & m, dst & m);

    write(sr, mask, Ccr::N, size.is_negative(res));
    write(sr, mask, Ccr::Z, res == 0);
    write(sr, mask, Ccr::V, size.is_negative((src ^ dst) & (res ^ dst)));
    write(sr, mask, Ccr::C, src > dst);
}

/// Flags of a logical operation or a move: N and Z from the result, V and C cleared.
#[inline(always)]
pub fn apply_logical(sr: &mut StatusRegister, size: Size, res: u32, mask: Ccr) {
    apply_logical_noclobber(sr, size, res, mask);
    write(sr, mask, Ccr::V, false);
    write(sr, mask, Ccr::C, false);
}

/// Flags of a test that only sets N and Z, leaving V and C alone.
#[inline(always)]
pub fn apply_logical_noclobber(sr: &mut StatusRegister, size: Size, res: u32, mask: Ccr) {
    write(sr, mask, Ccr::N, size.is_negative(res));
    write(sr, mask, Ccr::Z, size.is_zero(res));
}

/// Flags of an addition with extend `dst + src + X`. Z is only cleared, never set.
#[inline(always)]
pub fn apply_addx(sr: &mut StatusRegister, size: Size, res: u32, src: u32, dst: u32, mask: Ccr) {
    let m = size.mask();
    let (res, src, dst) = (res & m, src & m, dst & m);
    let c = size.is_negative(src ^ ((src ^ dst) & (dst ^ res)));

    write(sr, mask, Ccr::N, size.is_negative(res));
    if res != 0 {
        write(sr, mask, Ccr::Z, false);
    }
    write(sr, mask, Ccr::V, size.is_negative((src ^ res) & (dst ^ res)));
    write(sr, mask, Ccr::C, c);
    write(sr, mask, Ccr::X, c);
}

/// Flags of a subtraction with extend `dst - src - X`. Z is only cleared, never set.
#[inline(always)]
pub fn apply_subx(sr: &mut StatusRegister, size: Size, res: u32, src: u32, dst: u32, mask: Ccr) {
    let m = size.mask();
    let (res, src, dst) = (res & m, src & m, dst & m);
    let c = size.is_negative(src ^ ((src ^ res) & (dst ^ res)));

    write(sr, mask, Ccr::N, size.is_negative(res));
    if res != 0 {
        write(sr, mask, Ccr::Z, false);
    }
    write(sr, mask, Ccr::V, size.is_negative((src ^ dst) & (dst ^ res)));
    write(sr, mask, Ccr::C, c);
    write(sr, mask, Ccr::X, c);
}

/// Flags of a shift or rotate: N and Z from the result, then the given V, C and X.
/// `x` is None for the rotates that leave X alone.
#[inline(always)]
pub fn apply_shift(sr: &mut StatusRegister, size: Size, res: u32, v: bool, c: bool, x: Option<bool>, mask: Ccr) {
    write(sr, mask, Ccr::N, size.is_negative(res));
    write(sr, mask, Ccr::Z, size.is_zero(res));
    write(sr, mask, Ccr::V, v);
    write(sr, mask, Ccr::C, c);
    if let Some(x) = x {
        write(sr, mask, Ccr::X, x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleared() -> StatusRegister {
        StatusRegister::from(0x2700)
    }

    #[test]
    fn add_byte_overflow() {
        let mut sr = cleared();
        apply_add(&mut sr, Size::Byte, 0x80, 0x01, 0x7F, Ccr::ALL);
        assert!(sr.n);
        assert!(sr.v);
        assert!(!sr.c);
        assert!(!sr.z);
        assert!(!sr.x);
    }

    #[test]
    fn add_carry_ignores_high_bits() {
        let mut sr = cleared();
        apply_add(&mut sr, Size::Word, 0x1_0000, 0xFFFF_0001, 0x1234_FFFF, Ccr::ALL);
        assert!(sr.z);
        assert!(sr.c);
        assert!(sr.x);
        assert!(!sr.v);
    }

    #[test]
    fn sub_word_borrow() {
        let mut sr = cleared();
        apply_sub(&mut sr, Size::Word, 0xFFFF, 0x0001, 0x0000, Ccr::ALL);
        assert!(sr.c);
        assert!(sr.x);
        assert!(sr.n);
        assert!(!sr.z);
        assert!(!sr.v);
    }

    #[test]
    fn sub_signed_overflow() {
        let mut sr = cleared();
        // 0x8000 - 1 = 0x7FFF
        apply_sub(&mut sr, Size::Word, 0x7FFF, 1, 0x8000, Ccr::ALL);
        assert!(sr.v);
        assert!(!sr.n);
        assert!(!sr.c);
    }

    #[test]
    fn cmp_keeps_x() {
        let mut sr = cleared();
        sr.x = true;
        apply_cmp(&mut sr, Size::Long, 0xFFFF_FFFF, 1, 0, Ccr::ALL);
        assert!(sr.x);
        assert!(sr.c);

        sr.x = false;
        apply_cmp(&mut sr, Size::Long, 0xFFFF_FFFF, 1, 0, Ccr::ALL);
        assert!(!sr.x);
    }

    #[test]
    fn addx_never_sets_z() {
        let mut sr = cleared();
        sr.z = false;
        apply_addx(&mut sr, Size::Byte, 0x00, 0xFF, 0x01, Ccr::ALL);
        assert!(!sr.z);
        assert!(sr.c);

        sr.z = true;
        apply_addx(&mut sr, Size::Byte, 0x00, 0xFF, 0x00, Ccr::ALL); // 0xFF + 0 + X=1
        assert!(sr.z);
        assert!(sr.c);
        apply_addx(&mut sr, Size::Byte, 0x02, 0x01, 0x00, Ccr::ALL);
        assert!(!sr.z);
        assert!(!sr.c);
    }

    #[test]
    fn subx_borrow_through_extend() {
        let mut sr = cleared();
        sr.z = true;
        // 0 - 0 - X(1) = 0xFF
        apply_subx(&mut sr, Size::Byte, 0xFF, 0x00, 0x00, Ccr::ALL);
        assert!(sr.c);
        assert!(sr.x);
        assert!(sr.n);
        assert!(!sr.z);
        assert!(!sr.v);
    }

    #[test]
    fn mask_limits_updates() {
        let mut sr = cleared();
        sr.v = true;
        sr.c = true;
        apply_logical(&mut sr, Size::Long, 0, Ccr::Z | Ccr::N);
        assert!(sr.z);
        assert!(sr.v);
        assert!(sr.c);

        apply_logical_noclobber(&mut sr, Size::Byte, 0x80, Ccr::ALL);
        assert!(sr.n);
        assert!(!sr.z);
        assert!(sr.v);
    }
}
