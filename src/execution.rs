// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instruction execution: the single step, the run loop, block execution and the nested calls used by the host.

use crate::{Cpu, Error, MemoryAccess, RegisterFile};
use crate::config::FpuMode;
use crate::dead_flags::Block;
use crate::exception::{FaultKind, Line, Vector};
use crate::interpreter::InterpreterResult;
use crate::interrupts::InterruptSource;
use crate::isa::{self, Isa, OpcodeDescriptor};
use crate::status_register::Ccr;

use log::{debug, trace};

use std::marker::PhantomData;

/// The emulator opcode that ends a nested call.
pub const EXEC_RETURN: u16 = 0x7100;

/// The outcome of [Cpu::step].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// An instruction completed normally.
    Retired,
    /// An exception was processed, the PC is at its handler.
    Exception(u8),
    /// An interrupt of the given level was taken.
    Interrupt(u8),
    /// The CPU is stopped and no interrupt can wake it up.
    Stopped,
    /// An emulator opcode (0x7101 to 0x713F) was executed, the PC is after it. It has to be handed to the [Host].
    EmulOp(u16),
    /// EXEC_RETURN was executed.
    ExecReturn,
}

/// The host side of the emulator opcodes.
pub trait Host<M: MemoryAccess + ?Sized> {
    /// Handles an emulator opcode. The host can read and write the registers and memory,
    /// and call back into the guest with [Cpu::execute_until_return] or [Cpu::execute_trap].
    fn emul_op(&mut self, cpu: &mut Cpu, memory: &mut M, opcode: u16) -> Result<(), Error>;
}

/// A host that ignores the emulator opcodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHost;

impl<M: MemoryAccess + ?Sized> Host<M> for NoHost {
    fn emul_op(&mut self, cpu: &mut Cpu, _: &mut M, opcode: u16) -> Result<(), Error> {
        debug!("Ignored emulator opcode {opcode:#06X} at {:#010X}", cpu.instruction_pc);
        Ok(())
    }
}

type Handler<M> = fn(&mut Cpu, &mut M, &OpcodeDescriptor) -> InterpreterResult;

/// The instruction handlers, indexed by [Isa].
struct Execute<M: MemoryAccess + ?Sized> {
    _m: PhantomData<M>,
}

impl<M: MemoryAccess + ?Sized> Execute<M> {
    const EXECUTE: [Handler<M>; Isa::_Size as usize] = [
        Cpu::execute_abcd,
        Cpu::execute_add,
        Cpu::execute_adda,
        Cpu::execute_add,
        Cpu::execute_addq,
        Cpu::execute_addx,
        Cpu::execute_and,
        Cpu::execute_and,
        Cpu::execute_andisr,
        Cpu::execute_shift,
        Cpu::execute_shift,
        Cpu::execute_bcc,
        Cpu::execute_bchg,
        Cpu::execute_bclr,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_bitfield,
        Cpu::execute_illegal,
        Cpu::execute_bra,
        Cpu::execute_bset,
        Cpu::execute_bsr,
        Cpu::execute_btst,
        Cpu::execute_cas,
        Cpu::execute_cas2,
        Cpu::execute_chk,
        Cpu::execute_chk2,
        Cpu::execute_nop,
        Cpu::execute_clr,
        Cpu::execute_cmp,
        Cpu::execute_cmpa,
        Cpu::execute_cmp,
        Cpu::execute_cmp,
        Cpu::execute_dbcc,
        Cpu::execute_divl,
        Cpu::execute_divs,
        Cpu::execute_divu,
        Cpu::execute_emulop,
        Cpu::execute_eor,
        Cpu::execute_eor,
        Cpu::execute_eorisr,
        Cpu::execute_exg,
        Cpu::execute_ext,
        Cpu::execute_extb,
        Cpu::execute_illegal,
        Cpu::execute_jmp,
        Cpu::execute_jsr,
        Cpu::execute_lea,
        Cpu::execute_link,
        Cpu::execute_shift,
        Cpu::execute_shift,
        Cpu::execute_move,
        Cpu::execute_move16,
        Cpu::execute_movea,
        Cpu::execute_movec,
        Cpu::execute_movefromccr,
        Cpu::execute_movefromsr,
        Cpu::execute_movem,
        Cpu::execute_movep,
        Cpu::execute_moveq,
        Cpu::execute_moves,
        Cpu::execute_movetoccr,
        Cpu::execute_movetosr,
        Cpu::execute_moveusp,
        Cpu::execute_mull,
        Cpu::execute_muls,
        Cpu::execute_mulu,
        Cpu::execute_nbcd,
        Cpu::execute_neg,
        Cpu::execute_negx,
        Cpu::execute_nop,
        Cpu::execute_not,
        Cpu::execute_or,
        Cpu::execute_or,
        Cpu::execute_orisr,
        Cpu::execute_pack,
        Cpu::execute_pea,
        Cpu::execute_nop,
        Cpu::execute_reset,
        Cpu::execute_shift,
        Cpu::execute_shift,
        Cpu::execute_shift,
        Cpu::execute_shift,
        Cpu::execute_rtd,
        Cpu::execute_rte,
        Cpu::execute_rtr,
        Cpu::execute_rts,
        Cpu::execute_sbcd,
        Cpu::execute_scc,
        Cpu::execute_stop,
        Cpu::execute_sub,
        Cpu::execute_suba,
        Cpu::execute_sub,
        Cpu::execute_subq,
        Cpu::execute_subx,
        Cpu::execute_swap,
        Cpu::execute_tas,
        Cpu::execute_trap_instruction,
        Cpu::execute_trapcc,
        Cpu::execute_trapv,
        Cpu::execute_tst,
        Cpu::execute_unlk,
        Cpu::execute_unpk,
    ];
}

impl Cpu {
    /// Returns the level of the interrupt to take now, if any. Level 7 is taken once per assertion.
    fn pending_interrupt(&mut self) -> Option<u8> {
        let level = self.interrupts.pending_level();
        if level == 7 {
            if self.nmi_latched {
                return None;
            }
            self.nmi_latched = true;
            return Some(7);
        }

        self.nmi_latched = false;
        (level > self.regs.sr.interrupt_mask).then_some(level)
    }

    /// Executes a single instruction, or takes a pending interrupt.
    ///
    /// Guest faults are processed and returned as [Step::Exception]. Errors are only returned when the core
    /// can't go on: a double bus fault, a halted CPU or a failing memory collaborator.
    pub fn step<M: MemoryAccess>(&mut self, memory: &mut M) -> Result<Step, Error> {
        if self.halted {
            return Err(Error::Halted);
        }

        if let Some(level) = self.pending_interrupt() {
            trace!("Interrupt level {level} at {:#010X}", self.regs.pc);
            self.interrupt(memory, level)?;
            return Ok(Step::Interrupt(level));
        }

        if self.stop {
            return Ok(Step::Stopped);
        }

        self.execute_instruction(memory)
    }

    /// Executes the instruction at the PC with the current live flags.
    fn execute_instruction<M: MemoryAccess>(&mut self, memory: &mut M) -> Result<Step, Error> {
        let sr = self.regs.sr;
        let snapshot = self.regs;
        self.instruction_pc = self.regs.pc;
        self.flow_changed = false;

        match self.fetch_and_execute(memory) {
            Ok(Some(step)) => Ok(step),
            Ok(None) => {
                let trace = sr.t1 || (sr.t0 && self.flow_changed);
                if trace {
                    let vector = Vector::Trace as u8;
                    self.raise(memory, vector, self.instruction_pc, None)?;
                    Ok(Step::Exception(vector))
                } else {
                    Ok(Step::Retired)
                }
            },
            Err(fault) => {
                if !fault.kind.is_trap() {
                    self.regs = snapshot;
                }
                trace!("{fault}");
                let vector = self.raise_fault(memory, fault)?;
                Ok(Step::Exception(vector))
            },
        }
    }

    /// Fetches, decodes and executes. Returns the step when the instruction is handled by the caller.
    fn fetch_and_execute<M: MemoryAccess>(&mut self, memory: &mut M) -> Result<Option<Step>, crate::Fault> {
        let opcode = self.get_next_word(memory)?;
        self.current_opcode = opcode;

        let Some(desc) = isa::lookup(opcode, self.config.level()) else {
            self.unimplemented(memory, opcode)?;
            return Ok(None);
        };

        if desc.isa == Isa::EmulOp && self.config.emul_ops {
            return Ok(Some(if opcode == EXEC_RETURN { Step::ExecReturn } else { Step::EmulOp(opcode) }));
        }

        if desc.is_privileged() && !self.regs.sr.s {
            return Err(self.fault(FaultKind::PrivilegeViolation));
        }

        Execute::<M>::EXECUTE[desc.isa as usize](self, memory, desc)?;
        Ok(None)
    }

    /// Opcodes with no descriptor: line A, line F (maybe to the FPU) and illegal.
    fn unimplemented<M: MemoryAccess>(&mut self, memory: &mut M, opcode: u16) -> InterpreterResult {
        match opcode >> 12 {
            0xA => Err(self.fault(FaultKind::UnimplementedInstruction(Line::A))),
            0xF => {
                if self.config.fpu == FpuMode::External {
                    if let Some(fpu) = self.fpu.as_mut() {
                        let result = fpu.execute(opcode, &mut self.regs, memory);
                        return result.map_err(|kind| self.fault(kind));
                    }
                }
                Err(self.fault(FaultKind::UnimplementedInstruction(Line::F)))
            },
            _ => Err(self.fault(FaultKind::IllegalInstruction)),
        }
    }

    /// Runs until `max_instructions` steps have been done, the CPU is stopped, EXEC_RETURN is executed
    /// or [Cpu::request_quit] is called. Emulator opcodes are given to the host.
    ///
    /// Returns the number of steps done.
    pub fn run<M: MemoryAccess, H: Host<M> + ?Sized>(&mut self, memory: &mut M, host: &mut H, max_instructions: usize) -> Result<usize, Error> {
        self.quit = false;
        let mut count = 0;

        while count < max_instructions && !self.quit {
            match self.step(memory)? {
                Step::Stopped => break,
                Step::ExecReturn => self.quit = true,
                Step::EmulOp(opcode) => host.emul_op(self, memory, opcode)?,
                _ => (),
            }
            count += 1;
        }

        Ok(count)
    }

    /// Executes a decoded block, computing only the flags that are live.
    ///
    /// Interrupts are sampled once at the start of the block, so an interrupt raised during the block is only taken
    /// at the next call, up to a whole block late. Use [Cpu::step] or [Cpu::run] when that latency matters.
    ///
    /// Execution leaves the block as soon as the flow goes elsewhere, on an exception or when the CPU stops.
    /// Every flag is computed while tracing.
    ///
    /// Returns the number of instructions executed.
    pub fn run_block<M: MemoryAccess, H: Host<M> + ?Sized>(&mut self, memory: &mut M, host: &mut H, block: &Block) -> Result<usize, Error> {
        if self.halted {
            return Err(Error::Halted);
        }

        if let Some(level) = self.pending_interrupt() {
            trace!("Interrupt level {level} at {:#010X}", self.regs.pc);
            self.interrupt(memory, level)?;
            return Ok(0);
        }

        let traced = self.regs.sr.t1 || self.regs.sr.t0;
        let mut count = 0;

        for instruction in block.instructions() {
            if self.stop || self.regs.pc != instruction.pc {
                break;
            }

            self.live_flags = if traced { Ccr::ALL } else { instruction.live_flags };
            let step = self.execute_instruction(memory);
            self.live_flags = Ccr::ALL;
            count += 1;

            match step? {
                Step::Retired => (),
                Step::EmulOp(opcode) => {
                    host.emul_op(self, memory, opcode)?;
                    break;
                },
                Step::ExecReturn => {
                    self.quit = true;
                    break;
                },
                _ => break,
            }
        }

        Ok(count)
    }

    /// Calls the guest routine at `entry` and runs it until it returns, with the given D0-D7 and A0-A6.
    ///
    /// EXEC_RETURN and a return address pointing to it are pushed on the stack, so the routine's RTS executes it.
    /// The registers after the routine are returned, then all the registers and the stop state of the
    /// caller are restored.
    pub fn execute_until_return<M: MemoryAccess, H: Host<M> + ?Sized>(&mut self, memory: &mut M, host: &mut H, entry: u32, regs: &RegisterFile) -> Result<RegisterFile, Error> {
        let saved = (self.regs, self.stop, self.quit);
        self.load_call_registers(regs);

        let result = self.push_call_frame(memory, entry).and_then(|()| self.run_nested(memory, host, 2));

        let (regs, stop, quit) = saved;
        self.regs = regs;
        self.stop = stop;
        self.quit = quit;
        result
    }

    /// Executes the given line A trap with the given D0-D7 and A0-A6, and returns the registers after it.
    ///
    /// The trap word is followed by EXEC_RETURN on the stack and executed there.
    pub fn execute_trap<M: MemoryAccess, H: Host<M> + ?Sized>(&mut self, memory: &mut M, host: &mut H, trap: u16, regs: &RegisterFile) -> Result<RegisterFile, Error> {
        let saved = (self.regs, self.stop, self.quit);
        self.load_call_registers(regs);

        let result = self.push_trap_stub(memory, trap).and_then(|()| self.run_nested(memory, host, 4));

        let (regs, stop, quit) = saved;
        self.regs = regs;
        self.stop = stop;
        self.quit = quit;
        result
    }

    fn load_call_registers(&mut self, regs: &RegisterFile) {
        self.regs.d = regs.d;
        self.regs.a.copy_from_slice(&regs.a[..7]);
        self.stop = false;
    }

    fn host_write_u16<M: MemoryAccess>(memory: &mut M, addr: u32, value: u16) -> Result<(), Error> {
        memory.write_u16(addr, value).map_err(|e| Error::Host { address: e.address() })
    }

    fn push_call_frame<M: MemoryAccess>(&mut self, memory: &mut M, entry: u32) -> Result<(), Error> {
        let stub = self.regs.sp().wrapping_sub(2);
        Self::host_write_u16(memory, stub, EXEC_RETURN)?;
        let sp = stub.wrapping_sub(4);
        memory.write_u32(sp, stub).map_err(|e| Error::Host { address: e.address() })?;

        *self.regs.sp_mut() = sp;
        self.regs.pc = entry;
        Ok(())
    }

    fn push_trap_stub<M: MemoryAccess>(&mut self, memory: &mut M, trap: u16) -> Result<(), Error> {
        let sp = self.regs.sp().wrapping_sub(4);
        Self::host_write_u16(memory, sp, trap)?;
        Self::host_write_u16(memory, sp.wrapping_add(2), EXEC_RETURN)?;

        *self.regs.sp_mut() = sp;
        self.regs.pc = sp;
        Ok(())
    }

    /// Runs until EXEC_RETURN, then pops the stub and returns the registers.
    fn run_nested<M: MemoryAccess, H: Host<M> + ?Sized>(&mut self, memory: &mut M, host: &mut H, stub_size: u32) -> Result<RegisterFile, Error> {
        loop {
            match self.step(memory)? {
                Step::ExecReturn => break,
                Step::EmulOp(opcode) => host.emul_op(self, memory, opcode)?,
                Step::Stopped => return Err(Error::StoppedInNestedCall { pc: self.regs.pc }),
                _ => (),
            }
        }

        let sp = self.regs.sp_mut();
        *sp = sp.wrapping_add(stub_size);
        Ok(self.regs.register_file())
    }
}
