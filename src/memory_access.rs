// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Memory access-related traits and the core's memory helpers.

use crate::Cpu;
use crate::exception::{BusAccess, Fault, FaultKind};
use crate::instruction::Size;
use crate::utils::IsEven;

use thiserror::Error;

/// Errors reported by the memory collaborator.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// The access is misaligned for the emulated bus. Vectored to the guest as an Address Error.
    #[error("address error at {0:#010X}")]
    AddressError(u32),
    /// Nothing answers at this address. Vectored to the guest as an Access (Bus) Error.
    #[error("bus error at {0:#010X}")]
    BusError(u32),
    /// The host failed to serve the access. This is not architectural and stops the core.
    #[error("host failure at {0:#010X}")]
    Host(u32),
}

impl MemoryError {
    /// The address of the failed access.
    pub const fn address(&self) -> u32 {
        match *self {
            Self::AddressError(a) | Self::BusError(a) | Self::Host(a) => a,
        }
    }
}

/// The trait to be implemented by the memory system that will be used by the core.
///
/// Every operand and instruction fetch goes through it. It owns the address translation.
/// On the 68000 and 68010, misaligned word and long accesses are detected by the core before calling it.
pub trait MemoryAccess {
    /// Returns a 8-bits integer from the given address.
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError>;

    /// Returns a big-endian 16-bits integer from the given address.
    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryError>;

    /// Returns a big-endian 32-bits integer from the given address.
    ///
    /// The default implementation is doing 2 calls to [Self::read_u16] with the high and low words.
    fn read_u32(&mut self, addr: u32) -> Result<u32, MemoryError> {
        Ok((self.read_u16(addr)? as u32) << 16 | self.read_u16(addr.wrapping_add(2))? as u32)
    }

    /// Stores the given 8-bits value at the given address.
    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError>;

    /// Stores the given 16-bits value at the given address, in big-endian format.
    fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryError>;

    /// Stores the given 32-bits value at the given address, in big-endian format.
    ///
    /// The default implementation is doing 2 calls to [Self::write_u16] with the high and low words.
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write_u16(addr, (value >> 16) as u16)?;
        self.write_u16(addr.wrapping_add(2), value as u16)
    }

    /// Called when the CPU executes a RESET instruction.
    fn reset(&mut self) {}
}

/// Return type of the core's memory helpers. Alias for `Result<T, Fault>`.
pub(crate) type AccessResult<T> = Result<T, Fault>;

impl Cpu {
    /// Builds the fault of a failed access.
    pub(crate) fn memory_fault(&self, error: MemoryError, access: BusAccess) -> Fault {
        let kind = match error {
            MemoryError::AddressError(_) => FaultKind::AddressError,
            MemoryError::BusError(_) => FaultKind::AccessFault,
            MemoryError::Host(_) => FaultKind::HostFailure,
        };

        Fault {
            kind,
            pc: self.instruction_pc,
            address: Some(error.address()),
            access,
            opcode: self.current_opcode,
        }
    }

    /// Checks the alignment of a data access. Only the 68000 and 68010 require aligned words and longs.
    #[inline(always)]
    fn check_data_alignment(&self, addr: u32, size: Size, access: BusAccess) -> AccessResult<()> {
        if !size.is_byte() && !addr.is_even() && self.config.level() < 2 {
            Err(self.memory_fault(MemoryError::AddressError(addr), access))
        } else {
            Ok(())
        }
    }

    /// Reads a value of the given size, zero-extended to 32 bits.
    pub(crate) fn read<M: MemoryAccess + ?Sized>(&self, memory: &mut M, addr: u32, size: Size) -> AccessResult<u32> {
        self.check_data_alignment(addr, size, BusAccess::Read)?;

        let value = match size {
            Size::Byte => memory.read_u8(addr).map(u32::from),
            Size::Word => memory.read_u16(addr).map(u32::from),
            Size::Long => memory.read_u32(addr),
        };

        value.map_err(|e| self.memory_fault(e, BusAccess::Read))
    }

    /// Writes the low bits of the value covered by the given size.
    pub(crate) fn write<M: MemoryAccess + ?Sized>(&self, memory: &mut M, addr: u32, size: Size, value: u32) -> AccessResult<()> {
        self.check_data_alignment(addr, size, BusAccess::Write)?;

        let result = match size {
            Size::Byte => memory.write_u8(addr, value as u8),
            Size::Word => memory.write_u16(addr, value as u16),
            Size::Long => memory.write_u32(addr, value),
        };

        result.map_err(|e| self.memory_fault(e, BusAccess::Write))
    }

    /// Returns the word at `self.regs.pc` then advances `self.regs.pc` by 2.
    ///
    /// Instruction fetches from odd addresses are address errors on every CPU.
    pub(crate) fn get_next_word<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M) -> AccessResult<u16> {
        let pc = self.regs.pc;
        if !pc.is_even() {
            return Err(self.memory_fault(MemoryError::AddressError(pc), BusAccess::Fetch));
        }

        let data = memory.read_u16(pc).map_err(|e| self.memory_fault(e, BusAccess::Fetch))?;
        self.regs.pc = pc.wrapping_add(2);
        Ok(data)
    }

    /// Returns the long at `self.regs.pc` then advances `self.regs.pc` by 4.
    pub(crate) fn get_next_long<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M) -> AccessResult<u32> {
        let high = self.get_next_word(memory)? as u32;
        let low = self.get_next_word(memory)? as u32;
        Ok(high << 16 | low)
    }

    /// Returns the immediate value of the given size, which takes a whole extension word for bytes.
    pub(crate) fn get_next_immediate<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, size: Size) -> AccessResult<u32> {
        match size {
            Size::Byte => Ok(self.get_next_word(memory)? as u32 & 0xFF),
            Size::Word => Ok(self.get_next_word(memory)? as u32),
            Size::Long => self.get_next_long(memory),
        }
    }

    /// Pops the 16-bits value from the stack.
    pub(crate) fn pop_word<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M) -> AccessResult<u16> {
        let addr = self.regs.sp();
        let value = self.read(memory, addr, Size::Word)? as u16;
        *self.regs.sp_mut() = addr.wrapping_add(2);
        Ok(value)
    }

    /// Pops the 32-bits value from the stack.
    pub(crate) fn pop_long<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M) -> AccessResult<u32> {
        let addr = self.regs.sp();
        let value = self.read(memory, addr, Size::Long)?;
        *self.regs.sp_mut() = addr.wrapping_add(4);
        Ok(value)
    }

    /// Pushes the given 16-bits value on the stack.
    pub(crate) fn push_word<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, value: u16) -> AccessResult<()> {
        let addr = self.regs.sp().wrapping_sub(2);
        self.write(memory, addr, Size::Word, value as u32)?;
        *self.regs.sp_mut() = addr;
        Ok(())
    }

    /// Pushes the given 32-bits value on the stack.
    pub(crate) fn push_long<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, value: u32) -> AccessResult<()> {
        let addr = self.regs.sp().wrapping_sub(4);
        self.write(memory, addr, Size::Long, value)?;
        *self.regs.sp_mut() = addr;
        Ok(())
    }
}
