// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dead condition code elimination over straight-line blocks.
//!
//! A flag written by an instruction is dead if every path from it overwrites the flag before reading it.
//! Inside a block there is a single path, so a backward pass gives, for each instruction, the flags that are
//! live after it. All the flags are live at the end of the block.
//!
//! An instruction that may fault stacks the Status Register, so every flag is live before it and it computes
//! all of its own flags. Interrupts are only taken at block boundaries by [Cpu::run_block](crate::Cpu::run_block).

use crate::MemoryAccess;
use crate::decoder;
use crate::isa::{self, Isa, OpcodeDescriptor, OperandSpec, Privilege};
use crate::status_register::Ccr;

use log::trace;

/// Returns true if the instruction can raise an exception other than an instruction fetch fault.
/// Branches are included for the odd target check of the exact 68000 mode.
pub fn may_fault(desc: &OpcodeDescriptor) -> bool {
    let memory = |spec: OperandSpec| spec.is_memory();

    memory(desc.src) || memory(desc.dst) || desc.privilege != Privilege::None || matches!(desc.isa,
        Isa::Chk | Isa::Chk2 | Isa::Divs | Isa::Divu | Isa::Divl |
        Isa::Trap | Isa::Trapv | Isa::Trapcc | Isa::Illegal | Isa::Bkpt | Isa::EmulOp |
        Isa::Bra | Isa::Bcc | Isa::Dbcc | Isa::Bsr | Isa::Jmp | Isa::Jsr |
        Isa::Rts | Isa::Rtr | Isa::Rtd | Isa::Link | Isa::Unlk | Isa::Pea |
        Isa::Cas2 | Isa::Move16 | Isa::Movec
    )
}

/// Computes the flags that are live after each instruction of a straight-line block.
pub fn analyze(block: &[&OpcodeDescriptor]) -> Vec<Ccr> {
    let mut live_after = vec![Ccr::ALL; block.len()];
    let mut live = Ccr::ALL;

    for (i, desc) in block.iter().enumerate().rev() {
        if may_fault(desc) {
            live = Ccr::ALL;
        } else {
            live_after[i] = live;
            live = live.difference(desc.flags_set) | desc.flags_used;
        }
    }

    live_after
}

/// An instruction of a decoded block.
#[derive(Clone, Copy, Debug)]
pub struct BlockInstruction {
    /// Address of the opcode.
    pub pc: u32,
    pub opcode: u16,
    pub descriptor: &'static OpcodeDescriptor,
    /// The flags the instruction has to compute.
    pub live_flags: Ccr,
}

/// A decoded straight-line block, ending at the first instruction that changes the flow of execution.
#[derive(Clone, Debug, Default)]
pub struct Block {
    instructions: Vec<BlockInstruction>,
}

impl Block {
    /// Decodes the block starting at `pc`, up to `max_instructions` long.
    ///
    /// Decoding stops before an opcode that is not valid on the given CPU or whose words can't be read,
    /// so the block may be empty. Blocks have to be decoded again if the code they cover is modified.
    pub fn decode<M: MemoryAccess + ?Sized>(memory: &mut M, pc: u32, cpu_level: u8, max_instructions: usize) -> Self {
        let mut instructions = Vec::new();
        let mut addr = pc;

        while instructions.len() < max_instructions {
            let Ok(opcode) = memory.read_u16(addr) else { break };
            let Some(descriptor) = isa::lookup(opcode, cpu_level) else { break };
            let base = addr.wrapping_add(2);
            let words = |i: u32| memory.read_u16(base.wrapping_add(i * 2)).ok();
            let Some(length) = decoder::instruction_length(descriptor, opcode, cpu_level, words) else { break };

            instructions.push(BlockInstruction { pc: addr, opcode, descriptor, live_flags: Ccr::ALL });
            addr = addr.wrapping_add(length);

            if descriptor.isa.is_flow_change() || descriptor.flags_used == Ccr::ALL {
                break;
            }
        }

        let descriptors: Vec<_> = instructions.iter().map(|i| i.descriptor).collect();
        for (instruction, live) in instructions.iter_mut().zip(analyze(&descriptors)) {
            instruction.live_flags = instruction.descriptor.flag_mask() & live;
        }

        trace!("Decoded block at {pc:#010X}: {} instructions", instructions.len());
        Self { instructions }
    }

    /// The address of the first instruction.
    pub fn start(&self) -> Option<u32> {
        self.instructions.first().map(|i| i.pc)
    }

    pub fn instructions(&self) -> &[BlockInstruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::lookup;

    fn descriptors(opcodes: &[u16]) -> Vec<&'static OpcodeDescriptor> {
        opcodes.iter().map(|&op| lookup(op, 0).unwrap()).collect()
    }

    #[test]
    fn overwritten_flags_are_dead() {
        // ADD.L D1,D0 ; ADD.L D2,D0 ; RTS
        let block = descriptors(&[0xD081, 0xD082, 0x4E75]);
        let live = analyze(&block);
        assert_eq!(live[0], Ccr::empty());
        assert_eq!(live[1], Ccr::ALL);
        assert_eq!(live[2], Ccr::ALL);
    }

    #[test]
    fn readers_keep_flags_alive() {
        // ADD.L D1,D0 ; ADDX.L D2,D3 ; MOVEQ #0,D4
        let block = descriptors(&[0xD081, 0xD782, 0x7800]);
        let live = analyze(&block);
        // ADDX reads X and Z, MOVEQ kills N, Z, V and C.
        assert_eq!(live[1], Ccr::X);
        assert_eq!(live[0], Ccr::X | Ccr::Z);
    }

    #[test]
    fn faulting_instructions_see_exact_flags() {
        // ADD.L D1,D0 ; MOVE.L (A0),D2 ; MOVEQ #0,D3
        let block = descriptors(&[0xD081, 0x2410, 0x7600]);
        let live = analyze(&block);
        assert_eq!(live[0], Ccr::ALL);
        assert_eq!(live[1], Ccr::ALL);
        assert_eq!(live[2], Ccr::ALL);

        // DIVU D1,D0 traps with the flags it computed.
        let block = descriptors(&[0x80C1, 0x7600]);
        assert_eq!(analyze(&block)[0], Ccr::ALL);
    }

    #[test]
    fn conditions_read_their_flags() {
        // SUBQ.L #1,D0 ; BNE.S
        let block = descriptors(&[0x5380, 0x66FC]);
        let live = analyze(&block);
        assert_eq!(live[0], Ccr::ALL);

        // TST.L D0 ; MOVEQ #1,D1 ; BEQ.S
        let block = descriptors(&[0x4A80, 0x7201, 0x67FC]);
        let live = analyze(&block);
        assert_eq!(live[1], Ccr::ALL);
        assert_eq!(live[0], Ccr::X);
    }
}
