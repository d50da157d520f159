// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use m68k_core::{Ccr, StatusRegister};

#[test]
fn status_register() {
    let mut sr = StatusRegister {
        t1: true,
        t0: false,
        s: true,
        m: false,
        interrupt_mask: 7,
        x: true,
        n: true,
        z: true,
        v: true,
        c: true,
    };

    assert_eq!(u16::from(StatusRegister::default()), 0x2700, "StatusRegister::default()");
    assert_eq!(u16::from(StatusRegister::from(0)), 0, "StatusRegister::from(0)");
    assert_eq!(u16::from(sr), StatusRegister::MASK_68000, "into::<u16>()");

    sr.t0 = true;
    sr.m = true;
    assert_eq!(u16::from(sr), StatusRegister::MASK_68020, "into::<u16>() with T0 and M");

    sr.set_flag(Ccr::X | Ccr::C, false);
    assert_eq!(sr.ccr(), 0x0E, "StatusRegister::set_flag");

    for i in 0..=0x1F {
        sr.set_ccr(i);
        assert_eq!(u16::from(sr), 0xF700 | i, "StatusRegister::set_ccr for {}", i);
        assert_eq!(sr.condition(0), true,  "StatusRegister::condition(0) for {}", i);
        assert_eq!(sr.condition(1), false, "StatusRegister::condition(1) for {}", i);
        assert_eq!(sr.condition(2), i & 0b0101 == 0, "StatusRegister::condition(2) for {}", i);
        assert_eq!(sr.condition(3), i & 0b0101 != 0,  "StatusRegister::condition(3) for {}", i);
        assert_eq!(sr.condition(4), i & 0b0001 == 0,  "StatusRegister::condition(4) for {}", i);
        assert_eq!(sr.condition(5), i & 0b0001 != 0, "StatusRegister::condition(5) for {}", i);
        assert_eq!(sr.condition(6), i & 0b0100 == 0,  "StatusRegister::condition(6) for {}", i);
        assert_eq!(sr.condition(7), i & 0b0100 != 0, "StatusRegister::condition(7) for {}", i);
        assert_eq!(sr.condition(8), i & 0b0010 == 0, "StatusRegister::condition(8) for {}", i);
        assert_eq!(sr.condition(9), i & 0b0010 != 0,  "StatusRegister::condition(9) for {}", i);
        assert_eq!(sr.condition(10), i & 0b1000 == 0, "StatusRegister::condition(10) for {}", i);
        assert_eq!(sr.condition(11), i & 0b1000 != 0,  "StatusRegister::condition(11) for {}", i);
        assert_eq!(sr.condition(12), i & 0b1010 == 0b1010 || i & 0b1010 == 0, "StatusRegister::condition(12) for {}", i);
        assert_eq!(sr.condition(13), i & 0b1010 == 0b1000 || i & 0b1010 == 0b0010, "StatusRegister::condition(13) for {}", i);
        assert_eq!(sr.condition(14), i & 0b1110 == 0b1010 || i & 0b1110 == 0, "StatusRegister::condition(14) for {}", i);
        assert_eq!(sr.condition(15), i & 0b0100 != 0 || i & 0b1010 == 0b1000 || i & 0b1010 == 0b0010, "StatusRegister::condition(15) for {}", i);
    }
}

#[test]
fn condition_flags_cover_what_conditions_read() {
    assert_eq!(StatusRegister::condition_flags(0), Ccr::empty());
    assert_eq!(StatusRegister::condition_flags(2), Ccr::C | Ccr::Z);
    assert_eq!(StatusRegister::condition_flags(7), Ccr::Z);
    assert_eq!(StatusRegister::condition_flags(15), Ccr::N | Ccr::V | Ccr::Z);
}
