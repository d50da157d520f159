// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 68k status register.

use crate::utils::bits;

use bitflags::bitflags;

bitflags! {
    /// The bits of the Condition Code Register, as a set.
    ///
    /// Used to describe which flags an instruction reads, writes or leaves unaffected.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Ccr: u8 {
        const C = 0x01;
        const V = 0x02;
        const Z = 0x04;
        const N = 0x08;
        const X = 0x10;
        const NZVC = 0x0F;
        const ALL = 0x1F;
    }
}

/// 68k status register.
///
/// [StatusRegister::default] returns a Status Register set to 0x2700 (supervisor bit set, interrupt mask to 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusRegister {
    /// Trace on every instruction.
    pub t1: bool,
    /// Trace on change of flow (68020+).
    pub t0: bool,
    /// Supervisor
    pub s: bool,
    /// Master/interrupt state (68020+).
    pub m: bool,
    /// Interrupt Priority Mask
    pub interrupt_mask: u8,
    /// Extend
    pub x: bool,
    /// Negate
    pub n: bool,
    /// Zero
    pub z: bool,
    /// Overflow
    pub v: bool,
    /// Carry
    pub c: bool,
}

impl StatusRegister {
    /// The default raw value of 0x2700 (supervisor bit set, interrupt mask to 7).
    pub const DEFAULT: u16 = 0x2700;
    /// Implemented bits on the 68000 and 68010.
    pub const MASK_68000: u16 = 0xA71F;
    /// Implemented bits on the 68020 and later.
    pub const MASK_68020: u16 = 0xF71F;

    const fn t(&self) -> bool {
        true
    }

    const fn f(&self) -> bool {
        false
    }

    const fn hi(&self) -> bool {
        !self.c && !self.z
    }

    const fn ls(&self) -> bool {
        self.c || self.z
    }

    const fn cc(&self) -> bool {
        !self.c
    }

    const fn cs(&self) -> bool {
        self.c
    }

    const fn ne(&self) -> bool {
        !self.z
    }

    const fn eq(&self) -> bool {
        self.z
    }

    const fn vc(&self) -> bool {
        !self.v
    }

    const fn vs(&self) -> bool {
        self.v
    }

    const fn pl(&self) -> bool {
        !self.n
    }

    const fn mi(&self) -> bool {
        self.n
    }

    const fn ge(&self) -> bool {
        self.n == self.v
    }

    const fn lt(&self) -> bool {
        self.n != self.v
    }

    const fn gt(&self) -> bool {
        self.n == self.v && !self.z
    }

    const fn le(&self) -> bool {
        self.z || self.n != self.v
    }

    const CONDITIONS: [fn(&Self) -> bool; 16] = [
        Self::t,  Self::f,  Self::hi, Self::ls, Self::cc, Self::cs, Self::ne, Self::eq,
        Self::vc, Self::vs, Self::pl, Self::mi, Self::ge, Self::lt, Self::gt, Self::le,
    ];

    /// Tests the given condition from the raw bits of conditional instructions.
    pub fn condition(&self, cc: u8) -> bool {
        Self::CONDITIONS[cc as usize & 0xF](self)
    }

    /// The flags read by the given condition test.
    pub const fn condition_flags(cc: u8) -> Ccr {
        match cc & 0xF {
            0 | 1 => Ccr::empty(),
            2 | 3 => Ccr::C.union(Ccr::Z),
            4 | 5 => Ccr::C,
            6 | 7 => Ccr::Z,
            8 | 9 => Ccr::V,
            10 | 11 => Ccr::N,
            12 | 13 => Ccr::N.union(Ccr::V),
            _ => Ccr::N.union(Ccr::V).union(Ccr::Z),
        }
    }

    /// Returns the Condition Code Register part.
    pub const fn ccr(&self) -> u8 {
        (self.x as u8) << 4 |
        (self.n as u8) << 3 |
        (self.z as u8) << 2 |
        (self.v as u8) << 1 |
        (self.c as u8)
    }

    /// Sets the CCR bits to the one's of the given status register. Supervisor bits are unchanged.
    pub fn set_ccr(&mut self, sr: u16) {
        self.x = bits(sr, 4, 4) != 0;
        self.n = bits(sr, 3, 3) != 0;
        self.z = bits(sr, 2, 2) != 0;
        self.v = bits(sr, 1, 1) != 0;
        self.c = bits(sr, 0, 0) != 0;
    }

    /// Sets the given flag to the given value.
    #[inline(always)]
    pub fn set_flag(&mut self, flag: Ccr, value: bool) {
        if flag.contains(Ccr::X) { self.x = value; }
        if flag.contains(Ccr::N) { self.n = value; }
        if flag.contains(Ccr::Z) { self.z = value; }
        if flag.contains(Ccr::V) { self.v = value; }
        if flag.contains(Ccr::C) { self.c = value; }
    }
}

impl Default for StatusRegister {
    /// Returns a Status Register set to 0x2700 (supervisor bit set, interrupt mask to 7).
    fn default() -> Self {
        StatusRegister::from(StatusRegister::DEFAULT)
    }
}

impl From<u16> for StatusRegister {
    fn from(sr: u16) -> Self {
        Self {
            t1: bits(sr, 15, 15) != 0,
            t0: bits(sr, 14, 14) != 0,
            s: bits(sr, 13, 13) != 0,
            m: bits(sr, 12, 12) != 0,
            interrupt_mask: bits(sr, 8, 10) as u8,
            x: bits(sr, 4, 4) != 0,
            n: bits(sr, 3, 3) != 0,
            z: bits(sr, 2, 2) != 0,
            v: bits(sr, 1, 1) != 0,
            c: bits(sr, 0, 0) != 0,
        }
    }
}

impl From<StatusRegister> for u16 {
    fn from(sr: StatusRegister) -> u16 {
        (sr.t1 as u16) << 15 |
        (sr.t0 as u16) << 14 |
        (sr.s as u16) << 13 |
        (sr.m as u16) << 12 |
        (sr.interrupt_mask as u16 & 7) << 8 |
        sr.ccr() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip_keeps_implemented_bits() {
        for raw in 0..=u16::MAX {
            let sr = StatusRegister::from(raw);
            assert_eq!(u16::from(sr), raw & StatusRegister::MASK_68020, "{raw:#X}");
        }
    }

    #[test]
    fn signed_conditions() {
        let mut sr = StatusRegister::default();
        sr.n = true;
        sr.v = false;
        assert!(sr.condition(13)); // LT
        assert!(!sr.condition(12)); // GE
        assert!(sr.condition(15)); // LE
        sr.v = true;
        assert!(sr.condition(12));
        assert!(sr.condition(14)); // GT
    }
}
