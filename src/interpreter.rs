// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data movement, arithmetic and logic instructions.

use crate::{Cpu, MemoryAccess};
use crate::addressing_modes::{AccessKind, AddressingMode, Operand};
use crate::exception::{Fault, FaultKind};
use crate::flags::{self, apply_logical};
use crate::instruction::Size;
use crate::isa::{EaMode, Isa, OpcodeDescriptor, OperandSpec};
use crate::memory_access::AccessResult;
use crate::status_register::{Ccr, StatusRegister};
use crate::utils::{bit, bits, sign_extend_byte};

/// Returns nothing on success, the fault to process on error. Alias for `Result<(), Fault>`.
pub(crate) type InterpreterResult = Result<(), Fault>;

type FlagFn = fn(&mut StatusRegister, Size, u32, u32, u32, Ccr);

/// The quick data of ADDQ, SUBQ and the shifts, where 0 means 8.
#[inline(always)]
const fn quick(opcode: u16) -> u32 {
    match bits(opcode, 9, 11) {
        0 => 8,
        q => q as u32,
    }
}

impl Cpu {
    /// The flags the current instruction has to compute.
    #[inline(always)]
    pub(crate) fn flag_mask(&self, desc: &OpcodeDescriptor) -> Ccr {
        desc.flag_mask() & self.live_flags
    }

    /// Resolves the operand described by the spec.
    pub(crate) fn operand<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, spec: OperandSpec, size: Size, access: AccessKind) -> AccessResult<Operand> {
        match spec.addressing_mode(self.current_opcode) {
            Some(mode) => self.resolve(memory, mode, size, access),
            None => Err(self.fault(FaultKind::IllegalInstruction)),
        }
    }

    /// Returns the value of a source operand.
    pub(crate) fn source<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, spec: OperandSpec, size: Size) -> AccessResult<u32> {
        match spec {
            OperandSpec::Quick => Ok(quick(self.current_opcode)),
            _ => {
                let operand = self.operand(memory, spec, size, AccessKind::Read)?;
                self.read_operand(memory, &operand)
            },
        }
    }

    /// `dst = dst op src` with arithmetic flags. The result is not stored for the comparisons.
    fn arithmetic<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor, op: fn(u32, u32) -> u32, apply: FlagFn, store: bool) -> InterpreterResult {
        let size = desc.size();
        let src = self.source(memory, desc.src, size)?;
        let access = if store { AccessKind::ReadModifyWrite } else { AccessKind::Read };
        let dst = self.operand(memory, desc.dst, size, access)?;
        let d = self.read_operand(memory, &dst)?;

        let res = op(d, src) & size.mask();
        let mask = self.flag_mask(desc);
        apply(&mut self.regs.sr, size, res, src, d, mask);

        if store {
            self.write_operand(memory, &dst, res)?;
        }
        Ok(())
    }

    /// `dst = dst op src` with logical flags.
    fn logical<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor, op: fn(u32, u32) -> u32) -> InterpreterResult {
        let size = desc.size();
        let src = self.source(memory, desc.src, size)?;
        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;

        let res = op(d, src) & size.mask();
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, size, res, mask);
        self.write_operand(memory, &dst, res)
    }

    /// ANDI, ORI and EORI to CCR (byte) or SR (word).
    fn logical_sr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor, op: fn(u32, u32) -> u32) -> InterpreterResult {
        let imm = self.source(memory, desc.src, desc.size())?;
        if desc.size == Some(Size::Byte) {
            let ccr = op(self.regs.sr.ccr() as u32, imm);
            self.regs.sr.set_ccr(ccr as u16);
        } else {
            let sr = op(u16::from(self.regs.sr) as u32, imm);
            self.set_sr(sr as u16);
        }
        Ok(())
    }

    /// ADDQ and SUBQ to an address register work on the whole register and leave the flags alone.
    fn quick_address(&mut self, desc: &OpcodeDescriptor, subtract: bool) -> Option<InterpreterResult> {
        match desc.dst.addressing_mode(self.current_opcode) {
            Some(AddressingMode::Ard(reg)) => {
                let data = quick(self.current_opcode);
                let an = self.regs.a_mut(reg);
                *an = if subtract { an.wrapping_sub(data) } else { an.wrapping_add(data) };
                Some(Ok(()))
            },
            _ => None,
        }
    }

    pub(super) fn execute_add<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.arithmetic(memory, desc, u32::wrapping_add, flags::apply_add, true)
    }

    pub(super) fn execute_addq<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        if let Some(result) = self.quick_address(desc, false) {
            return result;
        }
        self.arithmetic(memory, desc, u32::wrapping_add, flags::apply_add, true)
    }

    pub(super) fn execute_sub<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.arithmetic(memory, desc, u32::wrapping_sub, flags::apply_sub, true)
    }

    pub(super) fn execute_subq<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        if let Some(result) = self.quick_address(desc, true) {
            return result;
        }
        self.arithmetic(memory, desc, u32::wrapping_sub, flags::apply_sub, true)
    }

    /// CMP, CMPI and CMPM.
    pub(super) fn execute_cmp<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.arithmetic(memory, desc, u32::wrapping_sub, flags::apply_cmp, false)
    }

    /// ADDA, SUBA and CMPA. The source is sign-extended and the operation is always on 32 bits.
    fn address_arithmetic<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor, isa: Isa) -> InterpreterResult {
        let size = desc.size();
        let src = size.sign_extend(self.source(memory, desc.src, size)?);
        let reg = bits(self.current_opcode, 9, 11) as u8;
        let an = self.regs.a(reg);

        match isa {
            Isa::Adda => *self.regs.a_mut(reg) = an.wrapping_add(src),
            Isa::Suba => *self.regs.a_mut(reg) = an.wrapping_sub(src),
            _ => {
                let mask = self.flag_mask(desc);
                flags::apply_cmp(&mut self.regs.sr, Size::Long, an.wrapping_sub(src), src, an, mask);
            },
        }
        Ok(())
    }

    pub(super) fn execute_adda<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.address_arithmetic(memory, desc, Isa::Adda)
    }

    pub(super) fn execute_suba<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.address_arithmetic(memory, desc, Isa::Suba)
    }

    pub(super) fn execute_cmpa<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.address_arithmetic(memory, desc, Isa::Cmpa)
    }

    /// ADDX and SUBX, register to register or memory to memory with predecrement.
    fn extended<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor, subtract: bool) -> InterpreterResult {
        let size = desc.size();
        let src = self.source(memory, desc.src, size)?;
        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;
        let x = self.regs.sr.x as u32;
        let mask = self.flag_mask(desc);

        let res = if subtract {
            let res = d.wrapping_sub(src).wrapping_sub(x) & size.mask();
            flags::apply_subx(&mut self.regs.sr, size, res, src, d, mask);
            res
        } else {
            let res = d.wrapping_add(src).wrapping_add(x) & size.mask();
            flags::apply_addx(&mut self.regs.sr, size, res, src, d, mask);
            res
        };

        self.write_operand(memory, &dst, res)
    }

    pub(super) fn execute_addx<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.extended(memory, desc, false)
    }

    pub(super) fn execute_subx<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.extended(memory, desc, true)
    }

    pub(super) fn execute_neg<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;

        let res = 0u32.wrapping_sub(d) & size.mask();
        let mask = self.flag_mask(desc);
        flags::apply_sub(&mut self.regs.sr, size, res, d, 0, mask);
        self.write_operand(memory, &dst, res)
    }

    pub(super) fn execute_negx<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;

        let res = 0u32.wrapping_sub(d).wrapping_sub(self.regs.sr.x as u32) & size.mask();
        let mask = self.flag_mask(desc);
        flags::apply_subx(&mut self.regs.sr, size, res, d, 0, mask);
        self.write_operand(memory, &dst, res)
    }

    pub(super) fn execute_clr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let dst = self.operand(memory, desc.dst, size, AccessKind::Write)?;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, size, 0, mask);
        self.write_operand(memory, &dst, 0)
    }

    pub(super) fn execute_not<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let res = !self.read_operand(memory, &dst)? & size.mask();
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, size, res, mask);
        self.write_operand(memory, &dst, res)
    }

    pub(super) fn execute_tst<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let value = self.source(memory, desc.src, size)?;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, size, value, mask);
        Ok(())
    }

    pub(super) fn execute_tas<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let dst = self.operand(memory, desc.dst, Size::Byte, AccessKind::ReadModifyWrite)?;
        let value = self.read_operand(memory, &dst)?;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Byte, value, mask);
        self.write_operand(memory, &dst, value | 0x80)
    }

    /// AND and ANDI.
    pub(super) fn execute_and<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.logical(memory, desc, |d, s| d & s)
    }

    /// OR and ORI.
    pub(super) fn execute_or<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.logical(memory, desc, |d, s| d | s)
    }

    /// EOR and EORI.
    pub(super) fn execute_eor<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.logical(memory, desc, |d, s| d ^ s)
    }

    pub(super) fn execute_andisr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.logical_sr(memory, desc, |d, s| d & s)
    }

    pub(super) fn execute_orisr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.logical_sr(memory, desc, |d, s| d | s)
    }

    pub(super) fn execute_eorisr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.logical_sr(memory, desc, |d, s| d ^ s)
    }

    pub(super) fn execute_move<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let value = self.source(memory, desc.src, size)?;
        let dst = self.operand(memory, desc.dst, size, AccessKind::Write)?;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, size, value, mask);
        self.write_operand(memory, &dst, value)
    }

    pub(super) fn execute_movea<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let value = self.source(memory, desc.src, size)?;
        let dst = self.operand(memory, desc.dst, size, AccessKind::Write)?;
        self.write_operand(memory, &dst, value)
    }

    pub(super) fn execute_moveq<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let value = sign_extend_byte(self.current_opcode as u32);
        let reg = bits(self.current_opcode, 9, 11) as usize;
        self.regs.d[reg] = value;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Long, value, mask);
        Ok(())
    }

    pub(super) fn execute_exg<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let index = |spec: OperandSpec, opcode| match spec.addressing_mode(opcode) {
            Some(AddressingMode::Ard(reg)) => reg + 8,
            Some(AddressingMode::Drd(reg)) => reg,
            _ => 0,
        };
        let rx = index(desc.src, self.current_opcode);
        let ry = index(desc.dst, self.current_opcode);

        let x = self.regs.r(rx);
        let y = self.regs.r(ry);
        *self.regs.r_mut(rx) = y;
        *self.regs.r_mut(ry) = x;
        Ok(())
    }

    /// EXT.W and EXT.L.
    pub(super) fn execute_ext<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let reg = bits(self.current_opcode, 0, 2) as u8;
        let size = desc.size();
        let d = self.regs.d[reg as usize];

        let res = if size.is_word() {
            Size::Byte.sign_extend(d) & 0xFFFF
        } else {
            Size::Word.sign_extend(d)
        };
        self.regs.d[reg as usize] = size.merge(d, res);
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, size, res, mask);
        Ok(())
    }

    pub(super) fn execute_extb<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let reg = bits(self.current_opcode, 0, 2) as usize;
        let res = sign_extend_byte(self.regs.d[reg]);
        self.regs.d[reg] = res;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Long, res, mask);
        Ok(())
    }

    pub(super) fn execute_swap<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let reg = bits(self.current_opcode, 0, 2) as usize;
        let res = self.regs.d[reg].rotate_left(16);
        self.regs.d[reg] = res;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Long, res, mask);
        Ok(())
    }

    pub(super) fn execute_lea<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let mode = self.ea_mode(self.current_opcode)?;
        let addr = self.control_address(memory, mode)?;
        *self.regs.a_mut(bits(self.current_opcode, 9, 11) as u8) = addr;
        Ok(())
    }

    pub(super) fn execute_pea<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let mode = self.ea_mode(self.current_opcode)?;
        let addr = self.control_address(memory, mode)?;
        self.push_long(memory, addr)
    }

    /// BTST, BCHG, BCLR and BSET. The bit number is taken modulo 32 in data registers and modulo 8 in memory.
    fn bit_operation<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor, op: Option<fn(u32, u32) -> u32>) -> InterpreterResult {
        let number = match desc.src {
            OperandSpec::Extension => self.get_next_word(memory)? as u32,
            spec => self.source(memory, spec, Size::Long)?,
        };
        let size = desc.size();
        let mask = 1 << (number % size.bits());

        let access = if op.is_some() { AccessKind::ReadModifyWrite } else { AccessKind::Read };
        let dst = self.operand(memory, desc.dst, size, access)?;
        let value = self.read_operand(memory, &dst)?;

        if self.flag_mask(desc).contains(Ccr::Z) {
            self.regs.sr.z = value & mask == 0;
        }

        match op {
            Some(op) => self.write_operand(memory, &dst, op(value, mask)),
            None => Ok(()),
        }
    }

    pub(super) fn execute_btst<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.bit_operation(memory, desc, None)
    }

    pub(super) fn execute_bchg<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.bit_operation(memory, desc, Some(|v, m| v ^ m))
    }

    pub(super) fn execute_bclr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.bit_operation(memory, desc, Some(|v, m| v & !m))
    }

    pub(super) fn execute_bset<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        self.bit_operation(memory, desc, Some(|v, m| v | m))
    }

    /// All the shifts and rotates, register and memory forms.
    pub(super) fn execute_shift<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let count = match desc.src {
            OperandSpec::Quick => quick(self.current_opcode),
            OperandSpec::Ea(EaMode::Drd, _) => self.regs.d[bits(self.current_opcode, 9, 11) as usize] & 63,
            _ => 1,
        };

        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let value = self.read_operand(memory, &dst)?;

        let (res, v, c, x) = shift(desc.isa, size, value, count, self.regs.sr.x);
        let mask = self.flag_mask(desc);
        flags::apply_shift(&mut self.regs.sr, size, res, v, c, x, mask);
        self.write_operand(memory, &dst, res)
    }

    pub(super) fn execute_abcd<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let src = self.source(memory, desc.src, Size::Byte)?;
        let dst = self.operand(memory, desc.dst, Size::Byte, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;

        let (s, d, x) = (src as u16, d as u16, self.regs.sr.x as u16);
        let lo = (s & 0xF) + (d & 0xF) + x;
        let hi = (s & 0xF0) + (d & 0xF0);
        let tmp = hi + lo;
        let mut res = tmp;
        if lo > 9 {
            res += 6;
        }
        let carry = res & 0x3F0 > 0x90;
        if carry {
            res += 0x60;
        }

        let v = tmp & 0x80 == 0 && res & 0x80 != 0;
        self.bcd_flags(desc, res as u8, carry, v);
        self.write_operand(memory, &dst, res as u32 & 0xFF)
    }

    pub(super) fn execute_sbcd<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let src = self.source(memory, desc.src, Size::Byte)?;
        let dst = self.operand(memory, desc.dst, Size::Byte, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;

        let (s, d, x) = (src as u16, d as u16, self.regs.sr.x as u16);
        let lo = (d & 0xF).wrapping_sub(s & 0xF).wrapping_sub(x);
        let hi = (d & 0xF0).wrapping_sub(s & 0xF0);
        let tmp = hi.wrapping_add(lo);
        let mut res = tmp;
        let mut adjust = 0;
        if lo & 0xF0 != 0 {
            res = res.wrapping_sub(6);
            adjust = 6;
        }
        if d.wrapping_sub(s).wrapping_sub(x) & 0x100 != 0 {
            res = res.wrapping_sub(0x60);
        }
        let carry = d.wrapping_sub(s).wrapping_sub(adjust).wrapping_sub(x) & 0x300 > 0xFF;

        let v = tmp & 0x80 != 0 && res & 0x80 == 0;
        self.bcd_flags(desc, res as u8, carry, v);
        self.write_operand(memory, &dst, res as u32 & 0xFF)
    }

    pub(super) fn execute_nbcd<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let dst = self.operand(memory, desc.dst, Size::Byte, AccessKind::ReadModifyWrite)?;
        let s = self.read_operand(memory, &dst)? as u16;

        let mut lo = 0u16.wrapping_sub(s & 0xF).wrapping_sub(self.regs.sr.x as u16);
        let hi = 0u16.wrapping_sub(s & 0xF0);
        if lo > 9 {
            lo = lo.wrapping_sub(6);
        }
        let mut res = hi.wrapping_add(lo);
        let carry = res & 0x1F0 > 0x90;
        if carry {
            res = res.wrapping_sub(0x60);
        }

        let v = self.regs.sr.v;
        self.bcd_flags(desc, res as u8, carry, v);
        self.write_operand(memory, &dst, res as u32 & 0xFF)
    }

    /// Decimal carry in C and X, Z only cleared. N and V are only computed before the 68040.
    fn bcd_flags(&mut self, desc: &OpcodeDescriptor, res: u8, carry: bool, v: bool) {
        let mut mask = self.flag_mask(desc);
        if self.config.level() >= 4 {
            mask.remove(Ccr::N | Ccr::V);
        }

        if res != 0 && mask.contains(Ccr::Z) {
            self.regs.sr.z = false;
        }
        self.regs.sr.set_flag(mask & (Ccr::C | Ccr::X), carry);
        self.regs.sr.set_flag(mask & Ccr::N, res & 0x80 != 0);
        self.regs.sr.set_flag(mask & Ccr::V, v);
    }

    pub(super) fn execute_mulu<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let src = self.source(memory, desc.src, Size::Word)?;
        let reg = bits(self.current_opcode, 9, 11) as usize;
        let res = (self.regs.d[reg] & 0xFFFF) * src;
        self.regs.d[reg] = res;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Long, res, mask);
        Ok(())
    }

    pub(super) fn execute_muls<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let src = self.source(memory, desc.src, Size::Word)? as i16 as i32;
        let reg = bits(self.current_opcode, 9, 11) as usize;
        let res = (self.regs.d[reg] as i16 as i32 * src) as u32;
        self.regs.d[reg] = res;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Long, res, mask);
        Ok(())
    }

    /// Sets the flags of a division by zero, and returns the fault to raise.
    fn zero_divide(&mut self, desc: &OpcodeDescriptor) -> Fault {
        let mask = self.flag_mask(desc);
        self.regs.sr.set_flag(mask & (Ccr::V | Ccr::C), false);
        self.fault(FaultKind::ZeroDivide)
    }

    /// The quotient does not fit: nothing is stored.
    fn divide_overflow(&mut self, desc: &OpcodeDescriptor) {
        let mask = self.flag_mask(desc);
        self.regs.sr.set_flag(mask & (Ccr::V | Ccr::N), true);
        self.regs.sr.set_flag(mask & Ccr::C, false);
    }

    pub(super) fn execute_divu<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let divisor = self.source(memory, desc.src, Size::Word)?;
        if divisor == 0 {
            return Err(self.zero_divide(desc));
        }

        let reg = bits(self.current_opcode, 9, 11) as usize;
        let dividend = self.regs.d[reg];
        let quotient = dividend / divisor;
        if quotient > 0xFFFF {
            self.divide_overflow(desc);
            return Ok(());
        }

        let remainder = dividend % divisor;
        self.regs.d[reg] = remainder << 16 | quotient;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Word, quotient, mask);
        Ok(())
    }

    pub(super) fn execute_divs<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let divisor = self.source(memory, desc.src, Size::Word)? as i16 as i32;
        if divisor == 0 {
            return Err(self.zero_divide(desc));
        }

        let reg = bits(self.current_opcode, 9, 11) as usize;
        let dividend = self.regs.d[reg] as i32;
        let quotient = match dividend.checked_div(divisor) {
            Some(q) if q >= i16::MIN as i32 && q <= i16::MAX as i32 => q,
            _ => {
                self.divide_overflow(desc);
                return Ok(());
            },
        };

        let remainder = dividend % divisor;
        self.regs.d[reg] = (remainder as u32) << 16 | quotient as u16 as u32;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Word, quotient as u32, mask);
        Ok(())
    }

    /// MULU.L and MULS.L, 32 or 64 bits results.
    pub(super) fn execute_mull<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let ext = self.get_next_word(memory)?;
        let src = self.source(memory, desc.src, Size::Long)?;
        let dl = bits(ext, 12, 14) as usize;
        let dh = bits(ext, 0, 2) as usize;
        let signed = bit(ext, 11);
        let quad = bit(ext, 10);
        let mask = self.flag_mask(desc);

        let (res, overflow) = if signed {
            let res = self.regs.d[dl] as i32 as i64 * src as i32 as i64;
            (res as u64, res != res as i32 as i64)
        } else {
            let res = self.regs.d[dl] as u64 * src as u64;
            (res, res > 0xFFFF_FFFF)
        };

        if quad {
            self.regs.sr.set_flag(mask & Ccr::N, res & 1 << 63 != 0);
            self.regs.sr.set_flag(mask & Ccr::Z, res == 0);
            self.regs.sr.set_flag(mask & (Ccr::V | Ccr::C), false);
            self.regs.d[dl] = res as u32;
            self.regs.d[dh] = (res >> 32) as u32;
        } else {
            apply_logical(&mut self.regs.sr, Size::Long, res as u32, mask);
            self.regs.sr.set_flag(mask & Ccr::V, overflow);
            self.regs.d[dl] = res as u32;
        }
        Ok(())
    }

    /// DIVU.L and DIVS.L, 32 or 64 bits dividends.
    pub(super) fn execute_divl<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let ext = self.get_next_word(memory)?;
        let divisor = self.source(memory, desc.src, Size::Long)?;
        if divisor == 0 {
            return Err(self.zero_divide(desc));
        }

        let dq = bits(ext, 12, 14) as usize;
        let dr = bits(ext, 0, 2) as usize;
        let signed = bit(ext, 11);
        let quad = bit(ext, 10);

        let (quotient, remainder) = if signed {
            let dividend = if quad {
                ((self.regs.d[dr] as u64) << 32 | self.regs.d[dq] as u64) as i64
            } else {
                self.regs.d[dq] as i32 as i64
            };
            let divisor = divisor as i32 as i64;
            match dividend.checked_div(divisor) {
                Some(q) if q == q as i32 as i64 => (q as u32, (dividend % divisor) as u32),
                _ => {
                    self.divide_overflow(desc);
                    return Ok(());
                },
            }
        } else {
            let dividend = if quad {
                (self.regs.d[dr] as u64) << 32 | self.regs.d[dq] as u64
            } else {
                self.regs.d[dq] as u64
            };
            let divisor = divisor as u64;
            let q = dividend / divisor;
            if q > 0xFFFF_FFFF {
                self.divide_overflow(desc);
                return Ok(());
            }
            (q as u32, (dividend % divisor) as u32)
        };

        self.regs.d[dr] = remainder;
        self.regs.d[dq] = quotient;
        let mask = self.flag_mask(desc);
        apply_logical(&mut self.regs.sr, Size::Long, quotient, mask);
        Ok(())
    }

    /// CHK.W and CHK.L: traps when Dn < 0 or Dn > bound.
    pub(super) fn execute_chk<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let bound = size.sign_extend(self.source(memory, desc.src, size)?) as i32;
        let value = size.sign_extend(self.regs.d[bits(self.current_opcode, 9, 11) as usize]) as i32;

        if value < 0 {
            self.regs.sr.n = true;
            Err(self.fault(FaultKind::ChkRange))
        } else if value > bound {
            self.regs.sr.n = false;
            Err(self.fault(FaultKind::ChkRange))
        } else {
            Ok(())
        }
    }

    /// CHK2 and CMP2: checks a register against a pair of bounds in memory.
    pub(super) fn execute_chk2<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let ext = self.get_next_word(memory)?;
        let mode = self.ea_mode(self.current_opcode)?;
        let addr = self.control_address(memory, mode)?;

        let lower = self.read(memory, addr, size)?;
        let upper = self.read(memory, addr.wrapping_add(size as u32), size)?;
        let lower = size.sign_extend(lower) as i32;
        let upper = size.sign_extend(upper) as i32;

        let reg = bits(ext, 12, 15) as u8;
        let value = if reg >= 8 {
            self.regs.r(reg) as i32
        } else {
            size.sign_extend(self.regs.r(reg)) as i32
        };

        let out_of_bounds = value < lower || value > upper;
        let mask = self.flag_mask(desc);
        self.regs.sr.set_flag(mask & Ccr::Z, value == lower || value == upper);
        self.regs.sr.set_flag(mask & Ccr::C, out_of_bounds);

        if bit(ext, 11) && out_of_bounds {
            Err(self.fault(FaultKind::ChkRange))
        } else {
            Ok(())
        }
    }

    pub(super) fn execute_cas<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let ext = self.get_next_word(memory)?;
        let dst = self.operand(memory, desc.dst, size, AccessKind::ReadModifyWrite)?;
        let d = self.read_operand(memory, &dst)?;

        let dc = bits(ext, 0, 2) as usize;
        let du = bits(ext, 6, 8) as usize;
        let compare = self.regs.d[dc] & size.mask();
        let mask = self.flag_mask(desc);
        flags::apply_cmp(&mut self.regs.sr, size, d.wrapping_sub(compare), compare, d, mask);

        if d == compare {
            self.write_operand(memory, &dst, self.regs.d[du])
        } else {
            self.regs.d[dc] = size.merge(self.regs.d[dc], d);
            Ok(())
        }
    }

    /// CAS2: both operands are updated only if both comparisons succeed.
    pub(super) fn execute_cas2<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let ext1 = self.get_next_word(memory)?;
        let ext2 = self.get_next_word(memory)?;

        let addr1 = self.regs.r(bits(ext1, 12, 15) as u8);
        let addr2 = self.regs.r(bits(ext2, 12, 15) as u8);
        let (dc1, du1) = (bits(ext1, 0, 2) as usize, bits(ext1, 6, 8) as usize);
        let (dc2, du2) = (bits(ext2, 0, 2) as usize, bits(ext2, 6, 8) as usize);

        let d1 = self.read(memory, addr1, size)?;
        let d2 = self.read(memory, addr2, size)?;
        let mask = self.flag_mask(desc);

        let c1 = self.regs.d[dc1] & size.mask();
        flags::apply_cmp(&mut self.regs.sr, size, d1.wrapping_sub(c1), c1, d1, mask);
        if d1 == c1 {
            let c2 = self.regs.d[dc2] & size.mask();
            flags::apply_cmp(&mut self.regs.sr, size, d2.wrapping_sub(c2), c2, d2, mask);
            if d2 == c2 {
                self.write(memory, addr1, size, self.regs.d[du1])?;
                return self.write(memory, addr2, size, self.regs.d[du2]);
            }
        }

        self.regs.d[dc1] = size.merge(self.regs.d[dc1], d1);
        self.regs.d[dc2] = size.merge(self.regs.d[dc2], d2);
        Ok(())
    }

    /// MOVEM. Predecrement stores go from A7 to D0, the other modes from D0 to A7.
    pub(super) fn execute_movem<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let list = self.get_next_word(memory)?;
        let mode = self.ea_mode(self.current_opcode)?;
        let step = size as u32;

        if bit(self.current_opcode, 10) {
            let (mut addr, postincrement) = match mode {
                AddressingMode::Ariwpo(reg) => (self.regs.a(reg), Some(reg)),
                _ => (self.control_address(memory, mode)?, None),
            };

            for reg in 0..16u8 {
                if list & 1 << reg != 0 {
                    let value = self.read(memory, addr, size)?;
                    *self.regs.r_mut(reg) = size.sign_extend(value);
                    addr = addr.wrapping_add(step);
                }
            }

            if let Some(reg) = postincrement {
                *self.regs.a_mut(reg) = addr;
            }
        } else if let AddressingMode::Ariwpr(reg) = mode {
            let initial = self.regs.a(reg);
            let mut addr = initial;

            for i in 0..16u8 {
                if list & 1 << i != 0 {
                    let r = 15 - i;
                    addr = addr.wrapping_sub(step);
                    let value = if r == reg + 8 && self.config.level() >= 2 {
                        initial.wrapping_sub(step)
                    } else {
                        self.regs.r(r)
                    };
                    self.write(memory, addr, size, value)?;
                }
            }

            *self.regs.a_mut(reg) = addr;
        } else {
            let mut addr = self.control_address(memory, mode)?;

            for reg in 0..16u8 {
                if list & 1 << reg != 0 {
                    self.write(memory, addr, size, self.regs.r(reg))?;
                    addr = addr.wrapping_add(step);
                }
            }
        }

        Ok(())
    }

    /// MOVEP: transfers a register to or from alternate bytes of memory.
    pub(super) fn execute_movep<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let count = size as u32;
        let reg = bits(self.current_opcode, 9, 11) as usize;
        let to_memory = bit(self.current_opcode, 7);
        let operand = self.operand(memory, if to_memory { desc.dst } else { desc.src }, Size::Byte, AccessKind::Control)?;
        let addr = operand.address().unwrap_or(0);

        if to_memory {
            let value = self.regs.d[reg];
            for i in 0..count {
                let byte = value >> ((count - 1 - i) * 8);
                self.write(memory, addr.wrapping_add(i * 2), Size::Byte, byte)?;
            }
        } else {
            let mut value = 0;
            for i in 0..count {
                value = value << 8 | self.read(memory, addr.wrapping_add(i * 2), Size::Byte)?;
            }
            self.regs.d[reg] = size.merge(self.regs.d[reg], value);
        }

        Ok(())
    }

    /// MOVE16: copies an aligned 16-bytes line.
    pub(super) fn execute_move16<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let opcode = self.current_opcode;
        let ay = bits(opcode, 0, 2) as u8;

        let (src, dst) = if bit(opcode, 5) {
            let ext = self.get_next_word(memory)?;
            let ax = bits(ext, 12, 14) as u8;
            let src = self.regs.a(ay);
            let dst = self.regs.a(ax);
            *self.regs.a_mut(ay) = src.wrapping_add(16);
            if ax != ay {
                *self.regs.a_mut(ax) = dst.wrapping_add(16);
            }
            (src, dst)
        } else {
            let absolute = self.get_next_long(memory)?;
            let areg = self.regs.a(ay);
            if !bit(opcode, 4) {
                *self.regs.a_mut(ay) = areg.wrapping_add(16);
            }
            if bit(opcode, 3) {
                (absolute, areg)
            } else {
                (areg, absolute)
            }
        };

        let (src, dst) = (src & !15, dst & !15);
        let mut line = [0; 4];
        for (i, long) in line.iter_mut().enumerate() {
            *long = self.read(memory, src.wrapping_add(i as u32 * 4), Size::Long)?;
        }
        for (i, long) in line.iter().enumerate() {
            self.write(memory, dst.wrapping_add(i as u32 * 4), Size::Long, *long)?;
        }

        Ok(())
    }
}

/// Computes a shift or rotate. Returns the result, V, C and the new X (None when X is unaffected).
fn shift(isa: Isa, size: Size, value: u32, count: u32, x: bool) -> (u32, bool, bool, Option<bool>) {
    let width = size.bits();
    let mask = size.mask();
    let val = value & mask;

    if count == 0 {
        let c = matches!(isa, Isa::Roxl | Isa::Roxr) && x;
        return (val, false, c, None);
    }

    match isa {
        Isa::Asl => {
            if count >= width {
                let c = count == width && val & 1 != 0;
                (0, val != 0, c, Some(c))
            } else {
                // V is set if the sign bit changes at any time during the shift.
                let overflow = (u32::MAX << (width - 1 - count)) & mask;
                let v = val & overflow != overflow && val & overflow != 0;
                let tmp = val << (count - 1);
                let c = size.is_negative(tmp);
                ((tmp << 1) & mask, v, c, Some(c))
            }
        },
        Isa::Asr => {
            let sign = size.is_negative(val);
            if count >= width {
                (if sign { mask } else { 0 }, false, sign, Some(sign))
            } else {
                let tmp = val >> (count - 1);
                let c = tmp & 1 != 0;
                let mut res = tmp >> 1;
                if sign {
                    res |= (mask << (width - count)) & mask;
                }
                (res, false, c, Some(c))
            }
        },
        Isa::Lsl => {
            if count >= width {
                let c = count == width && val & 1 != 0;
                (0, false, c, Some(c))
            } else {
                let tmp = val << (count - 1);
                let c = size.is_negative(tmp);
                ((tmp << 1) & mask, false, c, Some(c))
            }
        },
        Isa::Lsr => {
            if count >= width {
                let c = count == width && size.is_negative(val);
                (0, false, c, Some(c))
            } else {
                let tmp = val >> (count - 1);
                let c = tmp & 1 != 0;
                (tmp >> 1, false, c, Some(c))
            }
        },
        Isa::Rol => {
            let n = count % width;
            let res = if n == 0 { val } else { (val << n | val >> (width - n)) & mask };
            (res, false, res & 1 != 0, None)
        },
        Isa::Ror => {
            let n = count % width;
            let res = if n == 0 { val } else { (val >> n | val << (width - n)) & mask };
            (res, false, size.is_negative(res), None)
        },
        Isa::Roxl => {
            let (mut res, mut x) = (val, x);
            for _ in 0..count % (width + 1) {
                let out = size.is_negative(res);
                res = (res << 1 | x as u32) & mask;
                x = out;
            }
            (res, false, x, Some(x))
        },
        _ => {
            let (mut res, mut x) = (val, x);
            for _ in 0..count % (width + 1) {
                let out = res & 1 != 0;
                res = res >> 1 | (x as u32) << (width - 1);
                x = out;
            }
            (res, false, x, Some(x))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asl_long_by_32() {
        let (res, v, c, x) = shift(Isa::Asl, Size::Long, 1, 32, false);
        assert_eq!(res, 0);
        assert!(v);
        assert!(c);
        assert_eq!(x, Some(true));

        // The last bit shifted out by 33 is beyond the operand.
        let (res, v, c, _) = shift(Isa::Asl, Size::Long, 1, 33, false);
        assert_eq!(res, 0);
        assert!(v);
        assert!(!c);
    }

    #[test]
    fn asl_overflow_from_shift_history() {
        // 0x40 << 1 changes the sign.
        let (res, v, c, _) = shift(Isa::Asl, Size::Byte, 0x40, 1, false);
        assert_eq!(res, 0x80);
        assert!(v);
        assert!(!c);

        // 0xC0 << 1 keeps the sign.
        let (res, v, c, _) = shift(Isa::Asl, Size::Byte, 0xC0, 1, false);
        assert_eq!(res, 0x80);
        assert!(!v);
        assert!(c);
    }

    #[test]
    fn asr_keeps_sign() {
        let (res, _, c, _) = shift(Isa::Asr, Size::Word, 0x8001, 1, false);
        assert_eq!(res, 0xC000);
        assert!(c);
        let (res, _, c, _) = shift(Isa::Asr, Size::Word, 0x8000, 20, false);
        assert_eq!(res, 0xFFFF);
        assert!(c);
    }

    #[test]
    fn zero_count_keeps_x() {
        let (res, v, c, x) = shift(Isa::Lsl, Size::Long, 0x1234, 0, true);
        assert_eq!(res, 0x1234);
        assert!(!v);
        assert!(!c);
        assert_eq!(x, None);

        let (_, _, c, _) = shift(Isa::Roxr, Size::Long, 0x1234, 0, true);
        assert!(c);
    }

    #[test]
    fn rotates() {
        let (res, _, c, x) = shift(Isa::Rol, Size::Byte, 0x81, 1, false);
        assert_eq!(res, 0x03);
        assert!(c);
        assert_eq!(x, None);

        let (res, _, c, _) = shift(Isa::Ror, Size::Byte, 0x01, 1, false);
        assert_eq!(res, 0x80);
        assert!(c);

        // ROXL.B by 9 is the identity.
        let (res, _, c, x) = shift(Isa::Roxl, Size::Byte, 0x5A, 9, true);
        assert_eq!(res, 0x5A);
        assert!(c);
        assert_eq!(x, Some(true));

        let (res, _, c, _) = shift(Isa::Roxl, Size::Byte, 0x80, 1, false);
        assert_eq!(res, 0x00);
        assert!(c);

        let (res, _, c, _) = shift(Isa::Roxr, Size::Word, 0x0001, 1, true);
        assert_eq!(res, 0x8000);
        assert!(c);
    }

    #[test]
    fn lsr_by_width() {
        let (res, _, c, _) = shift(Isa::Lsr, Size::Word, 0x8000, 16, false);
        assert_eq!(res, 0);
        assert!(c);
        let (res, _, c, _) = shift(Isa::Lsr, Size::Word, 0x8000, 15, false);
        assert_eq!(res, 1);
        assert!(!c);
    }
}
