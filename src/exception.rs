// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Faults and exception processing.

use crate::{Cpu, Error, MemoryAccess};
use crate::memory_access::AccessResult;

use log::{trace, warn};

/// Constant equal to the AccessError vector.
pub const ACCESS_ERROR: u8 = Vector::AccessError as u8;
/// Constant equal to the AddressError vector.
pub const ADDRESS_ERROR: u8 = Vector::AddressError as u8;

/// Exception vectors of the 68k.
///
/// You can directly cast the enum to u8 to get the vector number.
/// ```
/// use m68k_core::exception::Vector;
/// assert_eq!(Vector::AccessError as u8, 2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Vector {
    ResetSspPc = 0,
    /// Bus error. Sent when the accessed address is not in the memory range of the system.
    AccessError = 2,
    AddressError,
    IllegalInstruction,
    ZeroDivide,
    ChkInstruction,
    TrapVInstruction,
    PrivilegeViolation,
    Trace,
    LineAEmulator,
    LineFEmulator,
    CoprocessorProtocolViolation = 13,
    FormatError,
    UninitializedInterrupt,
    SpuriousInterrupt = 24,
    Level1Interrupt,
    Level2Interrupt,
    Level3Interrupt,
    Level4Interrupt,
    Level5Interrupt,
    Level6Interrupt,
    Level7Interrupt,
    Trap0Instruction,
    Trap1Instruction,
    Trap2Instruction,
    Trap3Instruction,
    Trap4Instruction,
    Trap5Instruction,
    Trap6Instruction,
    Trap7Instruction,
    Trap8Instruction,
    Trap9Instruction,
    Trap10Instruction,
    Trap11Instruction,
    Trap12Instruction,
    Trap13Instruction,
    Trap14Instruction,
    Trap15Instruction,
}

const fn is_interrupt(vector: u8) -> bool {
    vector >= Vector::SpuriousInterrupt as u8 && vector <= Vector::Level7Interrupt as u8
}

/// The kind of bus cycle that faulted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BusAccess {
    #[default]
    Read,
    Write,
    /// Instruction fetch.
    Fetch,
}

/// The unimplemented instruction lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line {
    /// Line 1010, used for the Macintosh OS traps.
    A,
    /// Line 1111, used for the FPU.
    F,
}

/// The instructions that trap on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapKind {
    /// TRAP #n.
    Trap(u8),
    TrapV,
    TrapCc,
}

/// Classification of the architectural faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    IllegalInstruction,
    UnimplementedInstruction(Line),
    PrivilegeViolation,
    AddressError,
    /// Bus error.
    AccessFault,
    ZeroDivide,
    /// CHK or CHK2 bound violation.
    ChkRange,
    ExplicitTrap(TrapKind),
    /// RTE found an unknown stack frame format.
    FormatError,
    /// The memory collaborator failed. Never vectored to the guest.
    HostFailure,
}

impl FaultKind {
    /// The exception vector of the fault.
    pub const fn vector(self) -> u8 {
        match self {
            Self::IllegalInstruction => Vector::IllegalInstruction as u8,
            Self::UnimplementedInstruction(Line::A) => Vector::LineAEmulator as u8,
            Self::UnimplementedInstruction(Line::F) => Vector::LineFEmulator as u8,
            Self::PrivilegeViolation => Vector::PrivilegeViolation as u8,
            Self::AddressError => ADDRESS_ERROR,
            Self::AccessFault | Self::HostFailure => ACCESS_ERROR,
            Self::ZeroDivide => Vector::ZeroDivide as u8,
            Self::ChkRange => Vector::ChkInstruction as u8,
            Self::ExplicitTrap(TrapKind::Trap(n)) => Vector::Trap0Instruction as u8 + (n & 0xF),
            Self::ExplicitTrap(_) => Vector::TrapVInstruction as u8,
            Self::FormatError => Vector::FormatError as u8,
        }
    }

    /// Faults raised after the instruction completed: the stacked PC is the one of the next instruction
    /// and the effects of the instruction are kept.
    ///
    /// The other faults roll the registers back to the start of the instruction.
    pub const fn is_trap(self) -> bool {
        matches!(self, Self::ZeroDivide | Self::ChkRange | Self::ExplicitTrap(_))
    }
}

/// An architectural fault, created by any part of the core and consumed by the exception processing.
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[error("{kind:?} (vector {}) at {pc:#010X}, opcode {opcode:#06X}", kind.vector())]
pub struct Fault {
    pub kind: FaultKind,
    /// Address of the faulting instruction.
    pub pc: u32,
    /// The accessed address, for address and bus errors.
    pub address: Option<u32>,
    /// The bus cycle that faulted, for address and bus errors.
    pub access: BusAccess,
    /// The opcode of the faulting instruction.
    pub opcode: u16,
}

impl Fault {
    /// The exception vector of the fault.
    pub const fn vector(&self) -> u8 {
        self.kind.vector()
    }
}

impl Cpu {
    /// Creates a fault of the given kind for the current instruction.
    #[inline(always)]
    pub(crate) fn fault(&self, kind: FaultKind) -> Fault {
        Fault {
            kind,
            pc: self.instruction_pc,
            address: None,
            access: BusAccess::Read,
            opcode: self.current_opcode,
        }
    }

    /// Processes the exception of the given vector: pushes the stack frame of the configured CPU and jumps to the handler.
    ///
    /// `faulting_pc` is the address of the instruction that caused the exception. It is stored in the frames that have
    /// an instruction address field. The stacked return address is the current PC.
    pub fn raise<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, vector: u8, faulting_pc: u32, faulting_address: Option<u32>) -> Result<(), Error> {
        self.dispatch(memory, vector, faulting_pc, faulting_address.map(|a| (a, BusAccess::Read)))
    }

    /// Vectors the given fault to the guest and returns the vector taken.
    pub(crate) fn raise_fault<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, fault: Fault) -> Result<u8, Error> {
        if fault.kind == FaultKind::HostFailure {
            let address = fault.address.unwrap_or(fault.pc);
            warn!("Host memory failure at {address:#010X} (instruction at {:#010X})", fault.pc);
            return Err(Error::Host { address });
        }

        let access = match fault.kind {
            FaultKind::AddressError | FaultKind::AccessFault => fault.address.map(|a| (a, fault.access)),
            _ => None,
        };

        let vector = fault.vector();
        self.dispatch(memory, vector, fault.pc, access)?;
        Ok(vector)
    }

    /// Takes the interrupt of the given level and raises the interrupt mask to it.
    pub(crate) fn interrupt<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, level: u8) -> Result<(), Error> {
        let pc = self.regs.pc;
        self.dispatch(memory, Vector::SpuriousInterrupt as u8 + level, pc, None)?;
        self.regs.sr.interrupt_mask = level;
        Ok(())
    }

    /// Processes an exception, and the address or bus error that may occur while doing it.
    fn dispatch<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, vector: u8, faulting_pc: u32, access: Option<(u32, BusAccess)>) -> Result<(), Error> {
        let saved = self.regs;
        self.stop = false;

        let fault = match self.process_exception(memory, vector, faulting_pc, access) {
            Ok(()) => return Ok(()),
            Err(fault) => fault,
        };

        self.regs = saved;
        if fault.kind == FaultKind::HostFailure {
            return Err(Error::Host { address: fault.address.unwrap_or(0) });
        }

        if vector == ACCESS_ERROR || vector == ADDRESS_ERROR {
            return Err(self.double_fault(vector, faulting_pc));
        }

        let nested = fault.vector();
        match self.process_exception(memory, nested, faulting_pc, fault.address.map(|a| (a, fault.access))) {
            Ok(()) => Ok(()),
            Err(f) if f.kind == FaultKind::HostFailure => Err(Error::Host { address: f.address.unwrap_or(0) }),
            Err(_) => {
                self.regs = saved;
                Err(self.double_fault(nested, faulting_pc))
            },
        }
    }

    fn double_fault(&mut self, vector: u8, pc: u32) -> Error {
        warn!("Double bus fault while processing vector {vector} of the instruction at {pc:#010X}, CPU halted");
        self.halted = true;
        Error::DoubleFault { vector, pc }
    }

    /// The function code of a bus cycle in the current privilege state.
    fn function_code(&self, access: BusAccess) -> u16 {
        let program = access == BusAccess::Fetch;
        (self.regs.sr.s as u16) << 2 | if program { 2 } else { 1 }
    }

    /// Effectively processes an exception.
    fn process_exception<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, vector: u8, faulting_pc: u32, access: Option<(u32, BusAccess)>) -> AccessResult<()> {
        trace!("Exception {vector} at {:#010X} (instruction {faulting_pc:#010X})", self.regs.pc);

        let sr: u16 = self.regs.sr.into();
        let pc = self.regs.pc;
        let offset = vector as u16 * 4;
        let level = self.config.level();

        // Computed before switching to supervisor mode.
        let fc = access.map(|(_, a)| self.function_code(a)).unwrap_or(0);

        self.regs.sr.s = true;
        self.regs.sr.t1 = false;
        self.regs.sr.t0 = false;

        if level == 0 {
            self.push_long(memory, pc)?;
            self.push_word(memory, sr)?;

            if let Some((address, access)) = access {
                // MC68000UM 6.3.9.1: group 0 frame.
                let status = ((access != BusAccess::Write) as u16) << 4 |
                    ((access != BusAccess::Fetch) as u16) << 3 |
                    fc;
                self.push_word(memory, self.current_opcode)?;
                self.push_long(memory, address)?;
                self.push_word(memory, status)?;
            }
        } else {
            match (vector, access) {
                (ACCESS_ERROR | ADDRESS_ERROR, Some((address, access))) if level == 1 => {
                    // Format $8, 68010 bus fault.
                    let ssw = match access {
                        BusAccess::Fetch => 0x2100,
                        BusAccess::Read => 0x1100,
                        BusAccess::Write => 0x1000,
                    } | fc;
                    for _ in 0..16 {
                        self.push_word(memory, 0)?; // Internal information
                    }
                    self.push_word(memory, self.current_opcode)?;
                    for _ in 0..5 {
                        self.push_word(memory, 0)?; // Data buffers
                    }
                    self.push_long(memory, address)?;
                    self.push_word(memory, ssw)?;
                    self.push_word(memory, 0x8000 | offset)?;
                },
                (ACCESS_ERROR | ADDRESS_ERROR, Some((address, _))) if level >= 4 => {
                    self.push_long(memory, address)?;
                    self.push_word(memory, 0x2000 | offset)?;
                },
                (ACCESS_ERROR | ADDRESS_ERROR, Some((address, access))) => {
                    // Format $A, short bus cycle fault.
                    let ssw = if access == BusAccess::Fetch {
                        0x0040 | fc
                    } else {
                        0x0100 | ((access == BusAccess::Read) as u16) << 6 | fc
                    };
                    self.push_long(memory, 0)?;
                    self.push_long(memory, 0)?; // Data output buffer
                    self.push_long(memory, 0)?;
                    self.push_long(memory, address)?;
                    self.push_word(memory, 0)?; // Stage B
                    self.push_word(memory, self.current_opcode)?; // Stage C
                    self.push_word(memory, ssw)?;
                    self.push_word(memory, 0)?;
                    self.push_word(memory, 0xA000 | offset)?;
                },
                (5 | 6 | 7 | 9, _) if level >= 2 => {
                    self.push_long(memory, faulting_pc)?;
                    self.push_word(memory, 0x2000 | offset)?;
                },
                _ if level >= 2 && self.regs.sr.m && is_interrupt(vector) => {
                    self.push_word(memory, offset)?;
                    self.push_long(memory, pc)?;
                    self.push_word(memory, sr)?;

                    // Throwaway frame on the interrupt stack, its SR brings RTE back to the master stack.
                    let throwaway = u16::from(self.regs.sr);
                    self.regs.sr.m = false;
                    self.push_word(memory, 0x1000 | offset)?;
                    self.push_long(memory, pc)?;
                    self.push_word(memory, throwaway)?;
                    return self.jump_to_vector(memory, vector);
                },
                _ => self.push_word(memory, offset)?,
            }

            self.push_long(memory, pc)?;
            self.push_word(memory, sr)?;
        }

        if is_interrupt(vector) {
            self.regs.sr.m = false;
        }

        self.jump_to_vector(memory, vector)
    }

    fn jump_to_vector<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, vector: u8) -> AccessResult<()> {
        let addr = self.regs.vbr.wrapping_add(vector as u32 * 4);
        self.regs.pc = memory.read_u32(addr).map_err(|e| self.memory_fault(e, BusAccess::Read))?;
        self.flow_changed = true;
        Ok(())
    }
}
