// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Program control, system control and trap instructions.

use crate::{Cpu, MemoryAccess};
use crate::addressing_modes::AccessKind;
use crate::exception::{BusAccess, Fault, FaultKind, TrapKind};
use crate::instruction::Size;
use crate::interpreter::InterpreterResult;
use crate::isa::OpcodeDescriptor;
use crate::utils::{IsEven, bit, bits, sign_extend_byte, sign_extend_word};

use log::{debug, trace};

/// Returns true if MOVEC can access the given control register on the given CPU.
const fn control_register_available(level: u8, regno: u16) -> bool {
    match level {
        1 => regno & 0x7FF <= 1,
        2 | 3 => regno & 0x7FF <= 2 || regno == 0x803 || regno == 0x804,
        4 => regno & 0x7FF <= 7 && regno != 0x802,
        _ => false,
    }
}

/// Returns true if RTE accepts the given stack frame format on the given CPU.
const fn frame_format_valid(level: u8, format: u16) -> bool {
    match (format, level) {
        (0, _) => true,
        (8, 1) => true,
        (1 | 2, 2..) => true,
        (9 | 0xA | 0xB, 2 | 3) => true,
        (3 | 7, 4) => true,
        _ => false,
    }
}

/// Length in bytes of a stack frame of the given format.
const fn frame_length(format: u16) -> u32 {
    match format {
        0 | 1 => 8,
        2 | 3 => 12,
        7 => 60,
        8 => 58,
        9 => 20,
        0xA => 32,
        _ => 92,
    }
}

impl Cpu {
    /// Checks a branch target. Odd targets fault at the branch only when the exact 68000 behaviour is asked for,
    /// otherwise the fetch at the target faults.
    fn check_target(&self, target: u32) -> InterpreterResult {
        if self.config.diagnostic_fidelity && !target.is_even() {
            Err(Fault {
                address: Some(target),
                access: BusAccess::Fetch,
                ..self.fault(FaultKind::AddressError)
            })
        } else {
            Ok(())
        }
    }

    /// Changes the flow of execution.
    pub(crate) fn jump(&mut self, target: u32) -> InterpreterResult {
        self.check_target(target)?;
        self.regs.pc = target;
        self.flow_changed = true;
        Ok(())
    }

    /// Reads the displacement of Bcc, BRA and BSR and returns the target.
    fn branch_target<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M) -> Result<u32, Fault> {
        let base = self.regs.pc;
        let displacement = match self.current_opcode as u8 {
            0 => sign_extend_word(self.get_next_word(memory)? as u32),
            0xFF if self.config.level() >= 2 => self.get_next_long(memory)?,
            disp => sign_extend_byte(disp as u32),
        };
        Ok(base.wrapping_add(displacement))
    }

    pub(super) fn execute_bcc<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let target = self.branch_target(memory)?;
        if self.regs.sr.condition(desc.condition.unwrap_or(0)) {
            self.jump(target)?;
        }
        Ok(())
    }

    pub(super) fn execute_bra<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let target = self.branch_target(memory)?;
        self.jump(target)
    }

    pub(super) fn execute_bsr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let target = self.branch_target(memory)?;
        self.check_target(target)?;
        self.push_long(memory, self.regs.pc)?;
        self.jump(target)
    }

    pub(super) fn execute_dbcc<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let base = self.regs.pc;
        let target = base.wrapping_add(sign_extend_word(self.get_next_word(memory)? as u32));

        if !self.regs.sr.condition(desc.condition.unwrap_or(0)) {
            let reg = bits(self.current_opcode, 0, 2) as u8;
            let counter = (self.regs.d[reg as usize] as u16).wrapping_sub(1);
            self.regs.d_word(reg, counter);
            if counter != 0xFFFF {
                self.jump(target)?;
            }
        }

        Ok(())
    }

    pub(super) fn execute_scc<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let dst = self.operand(memory, desc.dst, Size::Byte, AccessKind::Write)?;
        let value = if self.regs.sr.condition(desc.condition.unwrap_or(0)) { 0xFF } else { 0 };
        self.write_operand(memory, &dst, value)
    }

    pub(super) fn execute_trapcc<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        match desc.size {
            Some(Size::Long) => { self.get_next_long(memory)?; },
            Some(_) => { self.get_next_word(memory)?; },
            None => (),
        }

        if self.regs.sr.condition(desc.condition.unwrap_or(0)) {
            Err(self.fault(FaultKind::ExplicitTrap(TrapKind::TrapCc)))
        } else {
            Ok(())
        }
    }

    pub(super) fn execute_trapv<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        if self.regs.sr.v {
            Err(self.fault(FaultKind::ExplicitTrap(TrapKind::TrapV)))
        } else {
            Ok(())
        }
    }

    pub(super) fn execute_trap_instruction<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let vector = bits(self.current_opcode, 0, 3) as u8;
        Err(self.fault(FaultKind::ExplicitTrap(TrapKind::Trap(vector))))
    }

    /// ILLEGAL, and BKPT with no breakpoint acknowledge hardware.
    pub(super) fn execute_illegal<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        Err(self.fault(FaultKind::IllegalInstruction))
    }

    pub(super) fn execute_jmp<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let mode = self.ea_mode(self.current_opcode)?;
        let target = self.control_address(memory, mode)?;
        self.jump(target)
    }

    pub(super) fn execute_jsr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let mode = self.ea_mode(self.current_opcode)?;
        let target = self.control_address(memory, mode)?;
        self.check_target(target)?;
        self.push_long(memory, self.regs.pc)?;
        self.jump(target)
    }

    pub(super) fn execute_rts<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let pc = self.pop_long(memory)?;
        self.jump(pc)
    }

    pub(super) fn execute_rtr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let ccr = self.pop_word(memory)?;
        let pc = self.pop_long(memory)?;
        self.regs.sr.set_ccr(ccr);
        self.jump(pc)
    }

    pub(super) fn execute_rtd<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let displacement = sign_extend_word(self.get_next_word(memory)? as u32);
        let pc = self.pop_long(memory)?;
        let sp = self.regs.sp_mut();
        *sp = sp.wrapping_add(displacement);
        self.jump(pc)
    }

    /// RTE. Format $1 throwaway frames are followed to the frame of the master stack.
    pub(super) fn execute_rte<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let level = self.config.level();

        loop {
            let sp = self.regs.sp();
            let sr = self.read(memory, sp, Size::Word)? as u16;
            let pc = self.read(memory, sp.wrapping_add(2), Size::Long)?;

            if level == 0 {
                *self.regs.sp_mut() = sp.wrapping_add(6);
                self.set_sr(sr);
                return self.jump(pc);
            }

            let format = self.read(memory, sp.wrapping_add(6), Size::Word)? as u16 >> 12;
            if !frame_format_valid(level, format) {
                debug!("RTE with invalid stack frame format {format:#X} at {:#010X}", self.instruction_pc);
                return Err(self.fault(FaultKind::FormatError));
            }

            *self.regs.sp_mut() = sp.wrapping_add(frame_length(format));
            self.set_sr(sr);

            if format != 1 {
                return self.jump(pc);
            }
        }
    }

    pub(super) fn execute_link<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let reg = bits(self.current_opcode, 0, 2) as u8;
        let displacement = if desc.size == Some(Size::Long) {
            self.get_next_long(memory)?
        } else {
            sign_extend_word(self.get_next_word(memory)? as u32)
        };

        self.push_long(memory, self.regs.a(reg))?;
        let sp = self.regs.sp();
        *self.regs.a_mut(reg) = sp;
        *self.regs.sp_mut() = sp.wrapping_add(displacement);
        Ok(())
    }

    pub(super) fn execute_unlk<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let reg = bits(self.current_opcode, 0, 2) as u8;
        *self.regs.sp_mut() = self.regs.a(reg);
        let value = self.pop_long(memory)?;
        *self.regs.a_mut(reg) = value;
        Ok(())
    }

    pub(super) fn execute_moveusp<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let reg = bits(self.current_opcode, 0, 2) as u8;
        if bit(self.current_opcode, 3) {
            *self.regs.a_mut(reg) = self.regs.usp;
        } else {
            self.regs.usp = self.regs.a(reg);
        }
        Ok(())
    }

    pub(super) fn execute_movetoccr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let value = self.source(memory, desc.src, Size::Word)?;
        self.regs.sr.set_ccr(value as u16);
        Ok(())
    }

    pub(super) fn execute_movetosr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let value = self.source(memory, desc.src, Size::Word)?;
        self.set_sr(value as u16);
        Ok(())
    }

    pub(super) fn execute_movefromsr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let dst = self.operand(memory, desc.dst, Size::Word, AccessKind::Write)?;
        let sr = u16::from(self.regs.sr);
        self.write_operand(memory, &dst, sr as u32)
    }

    pub(super) fn execute_movefromccr<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let dst = self.operand(memory, desc.dst, Size::Word, AccessKind::Write)?;
        let ccr = self.regs.sr.ccr();
        self.write_operand(memory, &dst, ccr as u32)
    }

    /// MOVEC. Unavailable control registers make the instruction illegal.
    pub(super) fn execute_movec<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let ext = self.get_next_word(memory)?;
        let regno = ext & 0xFFF;
        let reg = bits(ext, 12, 15) as u8;
        let level = self.config.level();

        if !control_register_available(level, regno) {
            debug!("MOVEC with unavailable control register {regno:#05X} at {:#010X}", self.instruction_pc);
            return Err(self.fault(FaultKind::IllegalInstruction));
        }

        if bit(self.current_opcode, 0) {
            let value = self.regs.r(reg);
            self.write_control_register(regno, value);
        } else {
            *self.regs.r_mut(reg) = self.control_register(regno);
        }
        Ok(())
    }

    fn control_register(&self, regno: u16) -> u32 {
        let regs = &self.regs;
        match regno {
            0x000 => regs.sfc as u32,
            0x001 => regs.dfc as u32,
            0x002 => regs.cacr,
            0x003 => regs.mmu.tc,
            0x004 => regs.mmu.itt0,
            0x005 => regs.mmu.itt1,
            0x006 => regs.mmu.dtt0,
            0x007 => regs.mmu.dtt1,
            0x800 => regs.usp,
            0x801 => regs.vbr,
            0x802 => regs.caar,
            0x803 => regs.msp,
            0x804 => regs.isp,
            0x805 => regs.mmu.mmusr,
            0x806 => regs.mmu.urp,
            _ => regs.mmu.srp,
        }
    }

    fn write_control_register(&mut self, regno: u16, value: u32) {
        let level = self.config.level();
        let regs = &mut self.regs;
        match regno {
            0x000 => regs.sfc = value as u8 & 7,
            0x001 => regs.dfc = value as u8 & 7,
            0x002 => regs.cacr = match level {
                2 => value & 0x0000_0003,
                3 => value & 0x0000_3F13,
                _ => value & 0x8000_8000,
            },
            0x003 => regs.mmu.tc = value & 0xC000,
            0x004 => regs.mmu.itt0 = value,
            0x005 => regs.mmu.itt1 = value,
            0x006 => regs.mmu.dtt0 = value,
            0x007 => regs.mmu.dtt1 = value,
            0x800 => regs.usp = value,
            0x801 => regs.vbr = value,
            0x802 => regs.caar = value,
            0x803 => regs.msp = value,
            0x804 => regs.isp = value,
            0x805 => regs.mmu.mmusr = value,
            0x806 => regs.mmu.urp = value,
            _ => regs.mmu.srp = value,
        }
    }

    /// MOVES. The address space is flat, so the function codes are ignored.
    pub(super) fn execute_moves<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let size = desc.size();
        let ext = self.get_next_word(memory)?;
        let reg = bits(ext, 12, 15) as u8;

        if bit(ext, 11) {
            let value = self.regs.r(reg);
            let dst = self.operand(memory, desc.dst, size, AccessKind::Write)?;
            self.write_operand(memory, &dst, value)
        } else {
            let src = self.operand(memory, desc.dst, size, AccessKind::Read)?;
            let value = self.read_operand(memory, &src)?;
            let r = self.regs.r_mut(reg);
            *r = if reg >= 8 { size.sign_extend(value) } else { size.merge(*r, value) };
            Ok(())
        }
    }

    pub(super) fn execute_stop<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let sr = self.get_next_word(memory)?;
        self.set_sr(sr);
        self.stop = true;
        trace!("STOP #{sr:#06X} at {:#010X}", self.instruction_pc);
        Ok(())
    }

    pub(super) fn execute_reset<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        debug!("RESET instruction at {:#010X}", self.instruction_pc);
        memory.reset();
        Ok(())
    }

    /// NOP, and the 68040 cache and ATC maintenance instructions which have nothing to invalidate.
    pub(super) fn execute_nop<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        Ok(())
    }

    /// Reached only when the emulator opcodes are disabled.
    pub(super) fn execute_emulop<M: MemoryAccess + ?Sized>(&mut self, _: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        Err(self.fault(FaultKind::IllegalInstruction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movec_registers_by_level() {
        assert!(!control_register_available(0, 0x801));
        assert!(control_register_available(1, 0x801));
        assert!(!control_register_available(1, 0x002));
        assert!(control_register_available(2, 0x002));
        assert!(control_register_available(3, 0x804));
        assert!(!control_register_available(3, 0x003));
        assert!(control_register_available(4, 0x807));
        assert!(!control_register_available(4, 0x802));
        assert!(!control_register_available(4, 0x808));
    }

    #[test]
    fn frame_formats_by_level() {
        assert!(frame_format_valid(1, 8));
        assert!(!frame_format_valid(1, 2));
        assert!(frame_format_valid(2, 0xB));
        assert!(!frame_format_valid(4, 0xB));
        assert!(frame_format_valid(4, 7));
        assert!(!frame_format_valid(3, 4));
        assert_eq!(frame_length(0xA), 32);
        assert_eq!(frame_length(2), 12);
    }
}
