// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Motorola 68000 to 68040 instruction-set semantics engine, made to be the CPU core of classic Macintosh emulators.
//!
//! The core decodes opcodes through a descriptor table built once per process, executes them with bit-exact
//! condition codes, and turns every architectural fault into the exception stack frame of the configured CPU.
//! It does not count bus cycles.
//!
//! # How to use
//!
//! Since the memory map is application-dependant, it is the user's responsibility to define it by implementing
//! the [MemoryAccess] trait on their memory structure, and passing it to the core on each instruction execution.
//!
//! The extended opcodes (0x7100-0x713F) used by Macintosh emulators to patch the ROM are given back to the
//! application through the [Host] trait. A host callback can itself run guest code with
//! [Cpu::execute_until_return].
//!
//! Interrupts are requested by setting bits on the [InterruptFlags] handle returned by [Cpu::interrupt_flags],
//! which can be shared with device threads. They are sampled once per instruction.
//!
//! ## Basic usage:
//!
//! ```ignore
//! const MEM_SIZE: u32 = 65536;
//! struct Memory([u8; MEM_SIZE as usize]); // Define your memory management system.
//!
//! impl MemoryAccess for Memory { // Implement the MemoryAccess trait.
//!     fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError> {
//!         self.0.get(addr as usize).copied().ok_or(MemoryError::BusError(addr))
//!     }
//!
//!     // And so on...
//! }
//!
//! fn main() {
//!     let mut memory = Memory([0; MEM_SIZE as usize]);
//!     // Load the program in memory here.
//!     let mut cpu = Cpu::new(Config::default())?;
//!     cpu.reset(&mut memory)?;
//!
//!     // Execute instructions
//!     cpu.run(&mut memory, &mut NoHost, 1000)?;
//! }
//! ```
//!
//! # Crate features
//!
//! - `serde`: derives `Serialize` and `Deserialize` on the configuration and register types.

pub mod addressing_modes;
pub mod config;
pub mod dead_flags;
mod decoder;
pub mod exception;
mod execution;
pub mod flags;
pub mod instruction;
mod interpreter;
mod interpreter_bitfield;
mod interpreter_control;
pub mod interrupts;
pub mod isa;
pub mod memory_access;
pub mod status_register;
pub mod utils;

pub use config::{Config, ConfigError, CpuLevel, FpuMode};
pub use exception::{Fault, FaultKind, Vector};
pub use execution::{Host, NoHost, Step, EXEC_RETURN};
pub use interrupts::{InterruptFlags, InterruptSource};
pub use memory_access::{MemoryAccess, MemoryError};
pub use status_register::{Ccr, StatusRegister};

use std::fmt;

use thiserror::Error;

/// Errors that stop the core. Guest faults are never reported here, they are vectored to the guest.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The memory collaborator itself failed.
    #[error("host memory failure at {address:#010X}")]
    Host { address: u32 },
    /// An address or bus error occured while processing an address or bus error. The CPU is halted.
    #[error("double bus fault while processing vector {vector} of the instruction at {pc:#010X}")]
    DoubleFault { vector: u8, pc: u32 },
    /// The CPU was halted by a double bus fault and has to be reset.
    #[error("the CPU is halted")]
    Halted,
    /// A nested call executed STOP with no interrupt able to wake it up.
    #[error("STOP executed at {pc:#010X} during a nested call")]
    StoppedInNestedCall { pc: u32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Registers of the CPU.
///
/// A7 is banked between the User, Interrupt and Master stack pointers, selected by the S and M bits.
/// Only the selected one is live, and [Registers::a] and [Registers::sp] return it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Registers {
    /// Data registers.
    pub d: [u32; 8],
    /// Address registers.
    pub a: [u32; 7],
    /// User Stack Pointer.
    pub usp: u32,
    /// Interrupt Stack Pointer, the System Stack Pointer of the 68000.
    pub isp: u32,
    /// Master Stack Pointer (68020+).
    pub msp: u32,
    /// Status Register.
    pub sr: StatusRegister,
    /// Program Counter.
    pub pc: u32,
    /// Vector Base Register (68010+).
    pub vbr: u32,
    /// Source Function Code (68010+).
    pub sfc: u8,
    /// Destination Function Code (68010+).
    pub dfc: u8,
    /// Cache Control Register (68020+).
    pub cacr: u32,
    /// Cache Address Register (68020 and 68030).
    pub caar: u32,
    /// 68040 MMU registers, kept as plain storage.
    pub mmu: MmuRegisters,
}

/// The 68040 MMU control registers. Address translation is done by the memory collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MmuRegisters {
    pub tc: u32,
    pub itt0: u32,
    pub itt1: u32,
    pub dtt0: u32,
    pub dtt1: u32,
    pub mmusr: u32,
    pub urp: u32,
    pub srp: u32,
}

impl Registers {
    /// Sets the lower 8-bits of the given data register to the given value.
    /// The higher 24-bits remains untouched.
    pub fn d_byte(&mut self, reg: u8, value: u8) {
        self.d[reg as usize] = self.d[reg as usize] & 0xFFFF_FF00 | value as u32;
    }

    /// Sets the lower 16-bits of the given data register to the given value.
    /// The higher 16-bits remains untouched.
    pub fn d_word(&mut self, reg: u8, value: u16) {
        self.d[reg as usize] = self.d[reg as usize] & 0xFFFF_0000 | value as u32;
    }

    /// Returns an address register.
    pub const fn a(&self, reg: u8) -> u32 {
        if reg < 7 {
            self.a[reg as usize]
        } else {
            self.sp()
        }
    }

    /// Returns a mutable reference to an address register.
    pub fn a_mut(&mut self, reg: u8) -> &mut u32 {
        if reg < 7 {
            &mut self.a[reg as usize]
        } else {
            self.sp_mut()
        }
    }

    /// Returns the active stack pointer: USP in user mode, MSP or ISP in supervisor mode depending on the M bit.
    pub const fn sp(&self) -> u32 {
        match (self.sr.s, self.sr.m) {
            (false, _) => self.usp,
            (true, false) => self.isp,
            (true, true) => self.msp,
        }
    }

    /// Returns a mutable reference to the active stack pointer.
    pub fn sp_mut(&mut self) -> &mut u32 {
        match (self.sr.s, self.sr.m) {
            (false, _) => &mut self.usp,
            (true, false) => &mut self.isp,
            (true, true) => &mut self.msp,
        }
    }

    /// Returns a general purpose register, D0-D7 for 0-7 and A0-A7 for 8-15.
    pub const fn r(&self, reg: u8) -> u32 {
        if reg < 8 {
            self.d[reg as usize]
        } else {
            self.a(reg & 7)
        }
    }

    /// Returns a mutable reference to a general purpose register, D0-D7 for 0-7 and A0-A7 for 8-15.
    pub fn r_mut(&mut self, reg: u8) -> &mut u32 {
        if reg < 8 {
            &mut self.d[reg as usize]
        } else {
            self.a_mut(reg & 7)
        }
    }

    /// The D0-D7/A0-A7/SR view of the registers.
    pub fn register_file(&self) -> RegisterFile {
        let mut a = [0; 8];
        a[..7].copy_from_slice(&self.a);
        a[7] = self.sp();

        RegisterFile {
            d: self.d,
            a,
            sr: self.sr.into(),
        }
    }
}

/// Plain register set exchanged with host callbacks and nested calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterFile {
    pub d: [u32; 8],
    pub a: [u32; 8],
    pub sr: u16,
}

/// Pluggable floating-point unit, used when the configuration asks for an external FPU.
pub trait Coprocessor {
    /// Executes the given line 1111 opcode. The PC points to the word that follows the opcode,
    /// and has to be advanced past the extension words the instruction uses.
    fn execute(&mut self, opcode: u16, regs: &mut Registers, memory: &mut dyn MemoryAccess) -> Result<(), FaultKind>;
}

/// A 68k core.
pub struct Cpu {
    /// The registers of the CPU.
    pub regs: Registers,
    /// True if the CPU is stopped (after a STOP instruction), false to switch back to normal instruction execution.
    pub stop: bool,

    config: Config,
    /// Set by a double bus fault, cleared by a reset.
    halted: bool,
    /// The opcode of the instruction currently executing.
    current_opcode: u16,
    /// The address of the instruction currently executing.
    instruction_pc: u32,
    /// Flags that have to be computed by the current instruction. All of them outside of [Cpu::run_block].
    live_flags: Ccr,
    /// Set when the current instruction changed the flow, for T0 tracing.
    flow_changed: bool,
    /// Set by EXEC_RETURN or by [Cpu::request_quit].
    quit: bool,
    interrupts: InterruptFlags,
    /// Level 7 is edge-triggered.
    nmi_latched: bool,
    fpu: Option<Box<dyn Coprocessor>>,
}

impl Cpu {
    /// Creates a new core with the given configuration.
    ///
    /// The registers are zeroed except the Status Register set to 0x2700. Call [Cpu::reset] to load
    /// the initial stack pointer and program counter from memory.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        isa::DescriptorTable::get();

        Ok(Self {
            regs: Registers::default(),
            stop: false,

            config,
            halted: false,
            current_opcode: 0xFFFF,
            instruction_pc: 0,
            live_flags: Ccr::ALL,
            flow_changed: false,
            quit: false,
            interrupts: InterruptFlags::new(),
            nmi_latched: false,
            fpu: None,
        })
    }

    /// The configuration of the core.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a handle to the interrupt flags sampled by the core, to be given to devices.
    pub fn interrupt_flags(&self) -> InterruptFlags {
        self.interrupts.clone()
    }

    /// Installs the FPU that receives the line 1111 opcodes when the configuration uses [FpuMode::External].
    pub fn set_coprocessor(&mut self, fpu: Box<dyn Coprocessor>) {
        self.fpu = Some(fpu);
    }

    /// Returns true if the CPU has been halted by a double bus fault.
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Makes [Cpu::run] return at the next instruction boundary.
    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    /// Resets the CPU by fetching the reset vectors: ISP from address 0 and PC from address 4.
    pub fn reset<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M) -> Result<(), Error> {
        self.regs.sr = StatusRegister::default();
        self.regs.vbr = 0;
        self.regs.cacr = 0;
        self.regs.isp = memory.read_u32(0).map_err(|e| Error::Host { address: e.address() })?;
        self.regs.pc = memory.read_u32(4).map_err(|e| Error::Host { address: e.address() })?;
        self.stop = false;
        self.halted = false;
        self.quit = false;
        self.nmi_latched = false;

        Ok(())
    }

    /// Writes the Status Register, keeping only the bits implemented by the configured CPU.
    pub fn set_sr(&mut self, sr: u16) {
        let mask = if self.config.level() >= 2 {
            StatusRegister::MASK_68020
        } else {
            StatusRegister::MASK_68000
        };
        self.regs.sr = StatusRegister::from(sr & mask);
    }

    /// Applies a [RegisterFile] to the registers. A7 is written to the active stack pointer.
    pub fn set_register_file(&mut self, regs: &RegisterFile) {
        self.set_sr(regs.sr);
        self.regs.d = regs.d;
        self.regs.a.copy_from_slice(&regs.a[..7]);
        *self.regs.sp_mut() = regs.a[7];
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("regs", &self.regs)
            .field("stop", &self.stop)
            .field("config", &self.config)
            .field("halted", &self.halted)
            .field("coprocessor", &self.fpu.is_some())
            .finish_non_exhaustive()
    }
}
