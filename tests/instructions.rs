// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instruction semantics, executed through [Cpu::step].

mod common;

use common::*;

use m68k_core::{CpuLevel, NoHost, Step};

#[test]
fn add_byte_overflow() {
    // ADD.B D1,D0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0xD001]);
    cpu.regs.d[0] = 0x1234_567F;
    cpu.regs.d[1] = 1;

    assert_eq!(cpu.step(&mut memory).unwrap(), Step::Retired);
    assert_eq!(cpu.regs.d[0], 0x1234_5680);
    let sr = cpu.regs.sr;
    assert!(sr.n && sr.v);
    assert!(!sr.z && !sr.c && !sr.x);
}

#[test]
fn sub_word_borrow() {
    // SUB.W D1,D0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x9041]);
    cpu.regs.d[0] = 0xABCD_0000;
    cpu.regs.d[1] = 1;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0xABCD_FFFF);
    let sr = cpu.regs.sr;
    assert!(sr.c && sr.x && sr.n);
    assert!(!sr.z && !sr.v);
}

#[test]
fn asl_long_by_register_count() {
    // ASL.L D1,D0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0xE3A0, 0xE3A0]);
    cpu.regs.d[0] = 1;
    cpu.regs.d[1] = 32;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0);
    assert!(cpu.regs.sr.v);
    assert!(cpu.regs.sr.c);
    assert!(cpu.regs.sr.x);
    assert!(cpu.regs.sr.z);

    // The count is taken modulo 64.
    cpu.regs.d[0] = 0x4000_0000;
    cpu.regs.d[1] = 65;
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x8000_0000);
    assert!(cpu.regs.sr.v);
    assert!(!cpu.regs.sr.c);
}

#[test]
fn end_to_end_subtract_and_branch() {
    let program = [
        0x7005, // MOVEQ #5,D0
        0x7203, // MOVEQ #3,D1
        0x9081, // SUB.L D1,D0
        0x6702, // BEQ.S +2
        0x4E71, // NOP
        0x4E71, // NOP
    ];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &program);

    assert_eq!(cpu.run(&mut memory, &mut NoHost, 4).unwrap(), 4);
    assert_eq!(cpu.regs.d[0], 2);
    assert!(!cpu.regs.sr.z);
    assert_eq!(cpu.regs.pc, CODE + 8);
}

#[test]
fn test_and_compare_only_touch_flags() {
    // TST.L D0 ; CMP.L D1,D0 ; CMPI.W #$10,(A0)
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x4A80, 0xB081, 0x0C50, 0x0010]);
    cpu.regs.d[0] = 0x8000_0000;
    cpu.regs.d[1] = 1;
    cpu.regs.a[0] = 0x2000;
    memory.set_word(0x2000, 0x0010);

    let before = cpu.regs;
    cpu.step(&mut memory).unwrap();
    assert!(cpu.regs.sr.n);
    cpu.step(&mut memory).unwrap();
    assert!(cpu.regs.sr.v);
    assert!(!cpu.regs.sr.c);
    cpu.step(&mut memory).unwrap();
    assert!(cpu.regs.sr.z);

    assert_eq!(cpu.regs.d, before.d);
    assert_eq!(cpu.regs.a, before.a);
    assert_eq!(memory.word(0x2000), 0x0010);
}

#[test]
fn dbcc_falls_through_at_minus_one() {
    // DBF D0,*
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x51C8, 0xFFFE]);
    cpu.regs.d[0] = 0x1234_0000;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x1234_FFFF);
    assert_eq!(cpu.regs.pc, CODE + 4);
}

#[test]
fn dbcc_loops() {
    let program = [
        0x7002,         // MOVEQ #2,D0
        0x5281,         // ADDQ.L #1,D1
        0x51C8, 0xFFFC, // DBF D0,-4
    ];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &program);

    assert_eq!(cpu.run(&mut memory, &mut NoHost, 7).unwrap(), 7);
    assert_eq!(cpu.regs.d[1], 3);
    assert_eq!(cpu.regs.d[0], 0xFFFF);
    assert_eq!(cpu.regs.pc, CODE + 8);
}

#[test]
fn movem_save_and_restore() {
    // MOVEM.L D0-D7/A0-A6,-(A7) ; MOVEM.L (A7)+,D0-D7/A0-A6
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x48E7, 0xFFFE, 0x4CDF, 0x7FFF]);
    for i in 0..8 {
        cpu.regs.d[i] = 0x1111_1111 * i as u32;
    }
    for i in 0..7 {
        cpu.regs.a[i] = 0x0100_0000 + i as u32;
    }
    let saved = cpu.regs;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.isp, INITIAL_SSP - 60);
    // D0 is at the lowest address.
    assert_eq!(memory.long(INITIAL_SSP - 60), 0);
    assert_eq!(memory.long(INITIAL_SSP - 4), 0x0100_0006);

    cpu.regs.d = [0; 8];
    cpu.regs.a = [0; 7];
    cpu.step(&mut memory).unwrap();

    assert_eq!(cpu.regs.d, saved.d);
    assert_eq!(cpu.regs.a, saved.a);
    assert_eq!(cpu.regs.isp, INITIAL_SSP);
}

#[test]
fn movem_word_loads_sign_extend() {
    // MOVEM.W (A0),D0/A1
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x4C90, 0x0201]);
    cpu.regs.a[0] = 0x2000;
    cpu.regs.d[0] = 0xFFFF_FFFF;
    memory.set_word(0x2000, 0x0001);
    memory.set_word(0x2002, 0x8000);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 1);
    assert_eq!(cpu.regs.a[1], 0xFFFF_8000);
}

#[test]
fn bsr_and_rts() {
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x610E]);
    memory.set_word(CODE + 0x10, 0x4E75);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.pc, CODE + 0x10);
    assert_eq!(cpu.regs.isp, INITIAL_SSP - 4);
    assert_eq!(memory.long(INITIAL_SSP - 4), CODE + 2);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.pc, CODE + 2);
    assert_eq!(cpu.regs.isp, INITIAL_SSP);
}

#[test]
fn link_and_unlk() {
    // LINK A6,#-8 ; UNLK A6
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x4E56, 0xFFF8, 0x4E5E]);
    cpu.regs.a[6] = 0xCAFE_0000;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.a[6], INITIAL_SSP - 4);
    assert_eq!(cpu.regs.isp, INITIAL_SSP - 12);
    assert_eq!(memory.long(INITIAL_SSP - 4), 0xCAFE_0000);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.a[6], 0xCAFE_0000);
    assert_eq!(cpu.regs.isp, INITIAL_SSP);
}

#[test]
fn decimal_arithmetic() {
    // ABCD D1,D0 ; ABCD D1,D0 ; SBCD D1,D0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0xC101, 0xC101, 0x8101]);
    cpu.regs.d[0] = 0x45;
    cpu.regs.d[1] = 0x38;
    cpu.regs.sr.z = true;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x83);
    assert!(!cpu.regs.sr.c);
    assert!(!cpu.regs.sr.z);

    cpu.regs.d[0] = 0x99;
    cpu.regs.d[1] = 0x01;
    cpu.regs.sr.z = true;
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x00);
    assert!(cpu.regs.sr.c);
    assert!(cpu.regs.sr.x);
    // Z is only cleared by a non-zero result.
    assert!(cpu.regs.sr.z);

    cpu.regs.d[0] = 0x00;
    cpu.regs.d[1] = 0x01;
    cpu.regs.sr.x = false;
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x99);
    assert!(cpu.regs.sr.c);
    assert!(cpu.regs.sr.x);
}

#[test]
fn divisions() {
    // DIVU D1,D0 ; DIVU D1,D0 ; DIVS D1,D0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x80C1, 0x80C1, 0x81C1]);
    cpu.regs.d[0] = 100_003;
    cpu.regs.d[1] = 10;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 3 << 16 | 10_000);

    // Overflow: nothing is stored.
    cpu.regs.d[0] = 0x0010_0000;
    cpu.regs.d[1] = 1;
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x0010_0000);
    assert!(cpu.regs.sr.v);
    assert!(!cpu.regs.sr.c);

    cpu.regs.d[0] = -7i32 as u32;
    cpu.regs.d[1] = 2;
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0xFFFF_FFFD);
    assert!(cpu.regs.sr.n);
    assert!(!cpu.regs.sr.v);
}

#[test]
fn long_multiply_and_divide() {
    // MULU.L D1,D2:D0 ; DIVU.L D1,D3:D0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &[0x4C01, 0x0402, 0x4C41, 0x0403]);
    cpu.regs.d[0] = 0xFFFF_FFFF;
    cpu.regs.d[1] = 2;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0xFFFF_FFFE);
    assert_eq!(cpu.regs.d[2], 1);
    assert!(!cpu.regs.sr.n);
    assert!(!cpu.regs.sr.z);

    cpu.regs.d[0] = 7;
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 3);
    assert_eq!(cpu.regs.d[3], 1);
}

#[test]
fn bit_field_extract_and_find() {
    // BFEXTU D0{4:8},D1 ; BFFFO D2{0:0},D3 ; BFINS D4,D5{28:8}
    let program = [0xE9C0, 0x1108, 0xEDC2, 0x3000, 0xEFC5, 0x4708];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &program);
    cpu.regs.d[0] = 0x1234_5678;
    cpu.regs.d[2] = 0x0001_0000;
    cpu.regs.d[4] = 0xAB;
    cpu.regs.d[5] = 0;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[1], 0x23);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[3], 15);

    // The field wraps around in a register.
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[5], 0xB000_000A);
    assert!(cpu.regs.sr.n);
}

#[test]
fn bit_field_in_memory_spans_bytes() {
    // BFSET (A0){12:16}
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &[0xEED0, 0x0310]);
    cpu.regs.a[0] = 0x2000;

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x2000), 0x000F_FFF0);
    assert!(cpu.regs.sr.z);
}

#[test]
fn compare_and_swap() {
    // CAS.L D1,D2,(A0)
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &[0x0ED0, 0x0081, 0x0ED0, 0x0081]);
    cpu.regs.a[0] = 0x2000;
    cpu.regs.d[1] = 5;
    cpu.regs.d[2] = 9;
    memory.set_long(0x2000, 5);

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x2000), 9);
    assert!(cpu.regs.sr.z);

    // Compare fails: the operand is loaded in the compare register.
    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x2000), 9);
    assert_eq!(cpu.regs.d[1], 9);
    assert!(!cpu.regs.sr.z);
}

#[test]
fn movec_vbr_moves_the_vector_table() {
    // MOVEC D0,VBR ; TRAP #0
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68010, &[0x4E7B, 0x0801, 0x4E40]);
    cpu.regs.d[0] = 0x3000;
    memory.set_long(0x3000 + 32 * 4, 0x5000);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.vbr, 0x3000);
    assert_eq!(cpu.step(&mut memory).unwrap(), Step::Exception(32));
    assert_eq!(cpu.regs.pc, 0x5000);
}

#[test]
fn movec_unavailable_register_is_illegal() {
    // MOVEC CACR,D0 on a 68010.
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68010, &[0x4E7A, 0x0002]);
    assert_eq!(cpu.step(&mut memory).unwrap(), Step::Exception(4));
    assert_eq!(cpu.regs.d[0], 0);
}

#[test]
fn reset_instruction_calls_memory() {
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x4E70]);
    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.resets, 1);
}

#[test]
fn movem_predecrement_stores_the_address_register() {
    // MOVEM.L D1/A0,-(A0)
    for (level, stored) in [(CpuLevel::Mc68000, 0x3000), (CpuLevel::Mc68020, 0x2FFC)] {
        let (mut cpu, mut memory) = setup(level, &[0x48E0, 0x4080]);
        cpu.regs.a[0] = 0x3000;
        cpu.regs.d[1] = 0x1111_1111;

        cpu.step(&mut memory).unwrap();
        assert_eq!(memory.long(0x2FFC), stored, "{level:?}");
        assert_eq!(memory.long(0x2FF8), 0x1111_1111, "{level:?}");
        assert_eq!(cpu.regs.a[0], 0x2FF8, "{level:?}");
    }
}

#[test]
fn movep_alternate_bytes() {
    // MOVEP.L D0,(4,A0) ; MOVEP.W (4,A0),D1
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68000, &[0x01C8, 0x0004, 0x0308, 0x0004]);
    cpu.regs.a[0] = 0x2000;
    cpu.regs.d[0] = 0x1122_3344;
    cpu.regs.d[1] = 0xFFFF_FFFF;

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.word(0x2004), 0x1100);
    assert_eq!(memory.word(0x2006), 0x2200);
    assert_eq!(memory.word(0x2008), 0x3300);
    assert_eq!(memory.word(0x200A), 0x4400);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[1], 0xFFFF_1122);
    assert_eq!(cpu.regs.pc, CODE + 8);
}

#[test]
fn move16_copies_lines() {
    let program = [
        0xF620, 0x9000,         // MOVE16 (A0)+,(A1)+
        0xF622, 0xA000,         // MOVE16 (A2)+,(A2)+
        0xF60B, 0x0000, 0x2000, // MOVE16 ($2000).L,(A3)+
    ];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68040, &program);
    for i in 0..4 {
        memory.set_long(0x2000 + i * 4, 0x1111_1111 * (i + 1));
    }
    cpu.regs.a[0] = 0x2004;
    cpu.regs.a[1] = 0x3000;
    cpu.regs.a[2] = 0x2000;
    cpu.regs.a[3] = 0x4000;

    // The source address is aligned down to the line.
    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x3000), 0x1111_1111);
    assert_eq!(memory.long(0x300C), 0x4444_4444);
    assert_eq!(cpu.regs.a[0], 0x2014);
    assert_eq!(cpu.regs.a[1], 0x3010);

    // The same register is only incremented once.
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.a[2], 0x2010);
    assert_eq!(memory.long(0x2008), 0x3333_3333);

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x4004), 0x2222_2222);
    assert_eq!(cpu.regs.a[3], 0x4010);
    assert_eq!(cpu.regs.pc, CODE + 14);
}

#[test]
fn pack_and_unpack() {
    let program = [
        0x8340, 0xCFD0, // PACK D0,D1,#$CFD0
        0x8782, 0x3030, // UNPK D2,D3,#$3030
        0x8348, 0x0000, // PACK -(A0),-(A1),#0
        0x898B, 0x3030, // UNPK -(A3),-(A4),#$3030
    ];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &program);
    cpu.regs.d[0] = 0x3132;
    cpu.regs.d[1] = 0xFFFF_FFFF;
    cpu.regs.d[2] = 0x47;
    cpu.regs.d[3] = 0xAAAA_0000;
    cpu.regs.a[0] = 0x2002;
    cpu.regs.a[1] = 0x3001;
    cpu.regs.a[3] = 0x2101;
    cpu.regs.a[4] = 0x2202;
    memory.set_word(0x2000, 0x0309);
    memory.bytes[0x2100] = 0x58;
    let sr = cpu.regs.sr;

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[1], 0xFFFF_FF12);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[3], 0xAAAA_3437);

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.bytes[0x3000], 0x39);
    assert_eq!(cpu.regs.a[0], 0x2000);
    assert_eq!(cpu.regs.a[1], 0x3000);

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.word(0x2200), 0x3538);
    assert_eq!(cpu.regs.a[3], 0x2100);
    assert_eq!(cpu.regs.a[4], 0x2200);

    // No flag is affected.
    assert_eq!(cpu.regs.sr, sr);
}

#[test]
fn compare_and_check_against_bounds() {
    let program = [
        0x02D0, 0x1000, // CMP2.W (A0),D1
        0x02D0, 0x1000, // CMP2.W (A0),D1
        0x02D0, 0x9000, // CMP2.W (A0),A1
        0x02D0, 0x1800, // CHK2.W (A0),D1
    ];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &program);
    cpu.regs.a[0] = 0x2000;
    memory.set_word(0x2000, 0xFFFB); // -5
    memory.set_word(0x2002, 10);

    // The bounds are signed: -3 is inside.
    cpu.regs.d[1] = 0x1234_FFFD;
    assert_eq!(cpu.step(&mut memory).unwrap(), Step::Retired);
    assert!(!cpu.regs.sr.z && !cpu.regs.sr.c);

    // Equal to a bound.
    cpu.regs.d[1] = 0xFFFF_000A;
    cpu.step(&mut memory).unwrap();
    assert!(cpu.regs.sr.z && !cpu.regs.sr.c);

    // Address registers are compared on 32 bits, so 0x10000 is above 10.
    cpu.regs.a[1] = 0x0001_0000;
    cpu.step(&mut memory).unwrap();
    assert!(!cpu.regs.sr.z && cpu.regs.sr.c);

    // CHK2 traps when out of bounds.
    cpu.regs.d[1] = 0x0000_FFF0;
    assert_eq!(cpu.step(&mut memory).unwrap(), Step::Exception(6));
    assert!(cpu.regs.sr.c);
    assert_eq!(cpu.regs.pc, handler(6));
}

#[test]
fn double_compare_and_swap() {
    // CAS2.L D0:D1,D2:D3,(A0):(A1), three times.
    let cas2 = [0x0EFC, 0x8080, 0x90C1];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &[cas2, cas2, cas2].concat());
    cpu.regs.a[0] = 0x2000;
    cpu.regs.a[1] = 0x2010;
    memory.set_long(0x2000, 10);
    memory.set_long(0x2010, 20);
    cpu.regs.d[0] = 10;
    cpu.regs.d[1] = 20;
    cpu.regs.d[2] = 0x111;
    cpu.regs.d[3] = 0x222;

    // Both compares succeed: both operands are updated.
    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x2000), 0x111);
    assert_eq!(memory.long(0x2010), 0x222);
    assert!(cpu.regs.sr.z);

    // The first compare fails: both operands are loaded in the compare registers.
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[0], 0x111);
    assert_eq!(cpu.regs.d[1], 0x222);
    assert!(!cpu.regs.sr.z);

    // The second compare fails: nothing is written.
    cpu.regs.d[1] = 5;
    cpu.regs.d[3] = 0x333;
    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.long(0x2000), 0x111);
    assert_eq!(memory.long(0x2010), 0x222);
    assert_eq!(cpu.regs.d[1], 0x222);
    assert!(!cpu.regs.sr.z);
}

#[test]
fn bit_field_sign_extend_change_and_clear() {
    let program = [
        0xEBC0, 0x120C, // BFEXTS D0{8:12},D1
        0xEAC2, 0x0004, // BFCHG D2{0:4}
        0xECD0, 0x0108, // BFCLR (A0){4:8}
    ];
    let (mut cpu, mut memory) = setup(CpuLevel::Mc68020, &program);
    cpu.regs.d[0] = 0x12F0_0000;
    cpu.regs.d[2] = 0xA000_0001;
    cpu.regs.a[0] = 0x2000;
    memory.set_word(0x2000, 0xFFFF);

    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[1], 0xFFFF_FF00);
    assert!(cpu.regs.sr.n && !cpu.regs.sr.z);

    // The flags come from the field before the change.
    cpu.step(&mut memory).unwrap();
    assert_eq!(cpu.regs.d[2], 0x5000_0001);
    assert!(cpu.regs.sr.n && !cpu.regs.sr.z);

    cpu.step(&mut memory).unwrap();
    assert_eq!(memory.word(0x2000), 0xF00F);
    assert_eq!(memory.word(0x2002), 0);
    assert!(cpu.regs.sr.n && !cpu.regs.sr.z && !cpu.regs.sr.v && !cpu.regs.sr.c);
}
