// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Addressing modes and the operand resolver.

use crate::{Cpu, MemoryAccess};
use crate::exception::FaultKind;
use crate::instruction::Size;
use crate::memory_access::AccessResult;
use crate::utils::{bits, sign_extend_byte, sign_extend_word};

/// Addressing mode of an effective address field, with its register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    /// Data Register Direct.
    Drd(u8),
    /// Address Register Direct.
    Ard(u8),
    /// Address Register Indirect.
    Ari(u8),
    /// Address Register Indirect With POstincrement.
    Ariwpo(u8),
    /// Address Register Indirect With PRedecrement.
    Ariwpr(u8),
    /// Address Register Indirect With Displacement.
    Ariwd(u8),
    /// Address Register Indirect With Index, brief or full extension word.
    Ariwi(u8),
    /// Absolute Short.
    AbsShort,
    /// Absolute Long.
    AbsLong,
    /// Program Counter Indirect With Displacement.
    Pciwd,
    /// Program Counter Indirect With Index, brief or full extension word.
    Pciwi,
    /// Immediate data.
    Immediate,
}

impl AddressingMode {
    /// Creates the addressing mode from the raw 3-bits mode and register fields.
    ///
    /// Returns None for the reserved mode 7 registers 5, 6 and 7.
    pub const fn new(mode: u16, reg: u16) -> Option<Self> {
        let r = (reg & 7) as u8;
        Some(match mode & 7 {
            0 => Self::Drd(r),
            1 => Self::Ard(r),
            2 => Self::Ari(r),
            3 => Self::Ariwpo(r),
            4 => Self::Ariwpr(r),
            5 => Self::Ariwd(r),
            6 => Self::Ariwi(r),
            _ => match r {
                0 => Self::AbsShort,
                1 => Self::AbsLong,
                2 => Self::Pciwd,
                3 => Self::Pciwi,
                4 => Self::Immediate,
                _ => return None,
            },
        })
    }

    /// Decodes the effective address field at the lowest 6 bits of the opcode.
    pub const fn from_opcode(opcode: u16) -> Option<Self> {
        Self::new(bits(opcode, 3, 5), bits(opcode, 0, 2))
    }

    /// Returns true if the operand lives in memory.
    pub const fn is_memory(self) -> bool {
        !matches!(self, Self::Drd(_) | Self::Ard(_) | Self::Immediate)
    }
}

/// How the instruction uses the operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// The value is fetched during resolution.
    Read,
    /// Only the location is resolved. The value is written later.
    Write,
    /// The value is fetched during resolution and written later at the same location, without a second read.
    ReadModifyWrite,
    /// Only the address is computed (LEA, JMP, MOVEM...).
    Control,
}

impl AccessKind {
    const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadModifyWrite)
    }
}

/// Where an operand lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    DataRegister(u8),
    AddressRegister(u8),
    Memory(u32),
    Immediate,
}

/// A resolved operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operand {
    pub target: Target,
    pub size: Size,
    /// The value read during resolution, zero-extended to 32 bits.
    pub value: Option<u32>,
}

impl Operand {
    /// Returns the memory address of the operand, if it is in memory.
    pub const fn address(&self) -> Option<u32> {
        match self.target {
            Target::Memory(addr) => Some(addr),
            _ => None,
        }
    }
}

impl Cpu {
    /// Resolves the operand of the given mode, fetching its extension words from the instruction stream.
    ///
    /// Postincrement and predecrement are applied to the address register immediately. If the instruction faults
    /// afterwards, the registers are rolled back by the execution engine.
    pub fn resolve<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, mode: AddressingMode, size: Size, access: AccessKind) -> AccessResult<Operand> {
        let target = match mode {
            AddressingMode::Drd(reg) => Target::DataRegister(reg),
            AddressingMode::Ard(reg) => Target::AddressRegister(reg),
            AddressingMode::Immediate => {
                let value = self.get_next_immediate(memory, size)?;
                return Ok(Operand { target: Target::Immediate, size, value: Some(value) });
            },
            _ => Target::Memory(self.effective_address(memory, mode, size)?),
        };

        let value = if access.reads() {
            Some(match target {
                Target::DataRegister(reg) => self.regs.d[reg as usize] & size.mask(),
                Target::AddressRegister(reg) => self.regs.a(reg) & size.mask(),
                Target::Memory(addr) => self.read(memory, addr, size)?,
                Target::Immediate => 0,
            })
        } else {
            None
        };

        Ok(Operand { target, size, value })
    }

    /// Decodes the effective address field at the lowest 6 bits of the given opcode.
    #[inline(always)]
    pub(crate) fn ea_mode(&self, opcode: u16) -> AccessResult<AddressingMode> {
        AddressingMode::from_opcode(opcode).ok_or_else(|| self.fault(FaultKind::IllegalInstruction))
    }

    /// Computes the address of a control addressing mode.
    pub(crate) fn control_address<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, mode: AddressingMode) -> AccessResult<u32> {
        match self.resolve(memory, mode, Size::Long, AccessKind::Control)?.target {
            Target::Memory(addr) => Ok(addr),
            _ => Err(self.fault(FaultKind::IllegalInstruction)),
        }
    }

    /// Returns the value of the operand, reading it if it has not been fetched during resolution.
    pub(crate) fn read_operand<M: MemoryAccess + ?Sized>(&self, memory: &mut M, operand: &Operand) -> AccessResult<u32> {
        if let Some(value) = operand.value {
            return Ok(value);
        }

        match operand.target {
            Target::DataRegister(reg) => Ok(self.regs.d[reg as usize] & operand.size.mask()),
            Target::AddressRegister(reg) => Ok(self.regs.a(reg) & operand.size.mask()),
            Target::Memory(addr) => self.read(memory, addr, operand.size),
            Target::Immediate => Ok(0),
        }
    }

    /// Stores the value in the operand. Data registers keep their bits above the size,
    /// address registers are written with the sign-extended value.
    pub(crate) fn write_operand<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, operand: &Operand, value: u32) -> AccessResult<()> {
        let size = operand.size;
        match operand.target {
            Target::DataRegister(reg) => {
                let d = &mut self.regs.d[reg as usize];
                *d = size.merge(*d, value);
                Ok(())
            },
            Target::AddressRegister(reg) => {
                *self.regs.a_mut(reg) = size.sign_extend(value);
                Ok(())
            },
            Target::Memory(addr) => self.write(memory, addr, size, value),
            Target::Immediate => Err(self.fault(FaultKind::IllegalInstruction)),
        }
    }

    /// Computes the address of a memory addressing mode.
    fn effective_address<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, mode: AddressingMode, size: Size) -> AccessResult<u32> {
        Ok(match mode {
            AddressingMode::Ari(reg) => self.regs.a(reg),
            AddressingMode::Ariwpo(reg) => self.ariwpo(reg, size),
            AddressingMode::Ariwpr(reg) => self.ariwpr(reg, size),
            AddressingMode::Ariwd(reg) => {
                let disp = sign_extend_word(self.get_next_word(memory)? as u32);
                self.regs.a(reg).wrapping_add(disp)
            },
            AddressingMode::Ariwi(reg) => {
                let base = self.regs.a(reg);
                let ext = self.get_next_word(memory)?;
                self.indexed_address(memory, base, ext)?
            },
            AddressingMode::AbsShort => sign_extend_word(self.get_next_word(memory)? as u32),
            AddressingMode::AbsLong => self.get_next_long(memory)?,
            AddressingMode::Pciwd => {
                // The base is the address of the extension word.
                let base = self.regs.pc;
                let disp = sign_extend_word(self.get_next_word(memory)? as u32);
                base.wrapping_add(disp)
            },
            AddressingMode::Pciwi => {
                let base = self.regs.pc;
                let ext = self.get_next_word(memory)?;
                self.indexed_address(memory, base, ext)?
            },
            AddressingMode::Drd(_) | AddressingMode::Ard(_) | AddressingMode::Immediate => {
                return Err(self.fault(FaultKind::IllegalInstruction));
            },
        })
    }

    /// Computes the address of the indexed modes from the brief or full extension word.
    ///
    /// The 68000 and 68010 ignore the scale field and always use the brief format.
    fn indexed_address<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, mut base: u32, ext: u16) -> AccessResult<u32> {
        let reg = bits(ext, 12, 15) as u8;
        let mut index = self.regs.r(reg);
        if ext & 0x0800 == 0 {
            index = sign_extend_word(index);
        }

        if self.config.level() < 2 {
            return Ok(base.wrapping_add(sign_extend_byte(ext as u32)).wrapping_add(index));
        }

        index <<= bits(ext, 9, 10);

        if ext & 0x0100 == 0 {
            return Ok(base.wrapping_add(sign_extend_byte(ext as u32)).wrapping_add(index));
        }

        // Full extension word.
        if ext & 0x0080 != 0 {
            base = 0;
        }
        if ext & 0x0040 != 0 {
            index = 0;
        }

        base = base.wrapping_add(match bits(ext, 4, 5) {
            2 => sign_extend_word(self.get_next_word(memory)? as u32),
            3 => self.get_next_long(memory)?,
            _ => 0,
        });

        let outer = match bits(ext, 0, 1) {
            2 => sign_extend_word(self.get_next_word(memory)? as u32),
            3 => self.get_next_long(memory)?,
            _ => 0,
        };

        let post_indexed = ext & 0x0004 != 0;
        if !post_indexed {
            base = base.wrapping_add(index);
        }
        if bits(ext, 0, 1) != 0 {
            base = self.read(memory, base, Size::Long)?;
        }
        if post_indexed {
            base = base.wrapping_add(index);
        }

        Ok(base.wrapping_add(outer))
    }

    /// Address Register Indirect With POstincrement. A7 moves by 2 for bytes.
    pub(crate) fn ariwpo(&mut self, reg: u8, size: Size) -> u32 {
        let inc = if reg == 7 { size.as_word_long() } else { size } as u32;
        let areg = self.regs.a_mut(reg);
        let addr = *areg;
        *areg = addr.wrapping_add(inc);
        addr
    }

    /// Address Register Indirect With PRedecrement. A7 moves by 2 for bytes.
    pub(crate) fn ariwpr(&mut self, reg: u8, size: Size) -> u32 {
        let dec = if reg == 7 { size.as_word_long() } else { size } as u32;
        let areg = self.regs.a_mut(reg);
        *areg = areg.wrapping_sub(dec);
        *areg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode7_reserved_registers() {
        assert_eq!(AddressingMode::new(7, 4), Some(AddressingMode::Immediate));
        assert_eq!(AddressingMode::new(7, 5), None);
        assert_eq!(AddressingMode::from_opcode(0x303C), Some(AddressingMode::Immediate));
    }
}
