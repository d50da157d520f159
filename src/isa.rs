// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ISA definition and the opcode descriptor table.
//!
//! Every legal opcode word is described by an [OpcodeDescriptor], found with [lookup]. Opcodes that only differ
//! by the values of their register or data fields share the same descriptor.

use crate::addressing_modes::AddressingMode;
use crate::decoder;
use crate::instruction::Size;
use crate::status_register::Ccr;
use crate::utils::bits;

use std::sync::OnceLock;

/// Mnemonics of the 68000 to 68040 integer instruction set.
///
/// The variants are used as the index of the dispatch table, so `_Size` has to stay last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Isa {
    Abcd,
    Add,
    Adda,
    Addi,
    Addq,
    Addx,
    And,
    Andi,
    /// ANDI to CCR (byte) and to SR (word).
    AndiSr,
    Asl,
    Asr,
    Bcc,
    Bchg,
    Bclr,
    Bfchg,
    Bfclr,
    Bfexts,
    Bfextu,
    Bfffo,
    Bfins,
    Bfset,
    Bftst,
    Bkpt,
    Bra,
    Bset,
    Bsr,
    Btst,
    Cas,
    Cas2,
    Chk,
    /// CHK2 and CMP2, told apart by the extension word.
    Chk2,
    /// CINV and CPUSH.
    Cinv,
    Clr,
    Cmp,
    Cmpa,
    Cmpi,
    Cmpm,
    Dbcc,
    /// DIVU.L and DIVS.L, told apart by the extension word.
    Divl,
    Divs,
    Divu,
    /// The 0x7100-0x713F extended opcodes, including EXEC_RETURN.
    EmulOp,
    Eor,
    Eori,
    /// EORI to CCR (byte) and to SR (word).
    EoriSr,
    Exg,
    Ext,
    Extb,
    Illegal,
    Jmp,
    Jsr,
    Lea,
    Link,
    Lsl,
    Lsr,
    Move,
    Move16,
    Movea,
    Movec,
    MoveFromCcr,
    MoveFromSr,
    Movem,
    Movep,
    Moveq,
    Moves,
    MoveToCcr,
    MoveToSr,
    MoveUsp,
    /// MULU.L and MULS.L, told apart by the extension word.
    Mull,
    Muls,
    Mulu,
    Nbcd,
    Neg,
    Negx,
    Nop,
    Not,
    Or,
    Ori,
    /// ORI to CCR (byte) and to SR (word).
    OriSr,
    Pack,
    Pea,
    Pflush,
    Reset,
    Rol,
    Ror,
    Roxl,
    Roxr,
    Rtd,
    Rte,
    Rtr,
    Rts,
    Sbcd,
    Scc,
    Stop,
    Sub,
    Suba,
    Subi,
    Subq,
    Subx,
    Swap,
    Tas,
    Trap,
    Trapcc,
    Trapv,
    Tst,
    Unlk,
    Unpk,
    _Size,
}

impl Isa {
    /// Returns true if the instruction may change the flow of execution or the supervisor state.
    pub const fn is_flow_change(self) -> bool {
        matches!(self,
            Self::Bcc | Self::Bra | Self::Bsr | Self::Dbcc | Self::Jmp | Self::Jsr |
            Self::Rtd | Self::Rte | Self::Rtr | Self::Rts |
            Self::Trap | Self::Trapv | Self::Trapcc | Self::Illegal | Self::Bkpt |
            Self::Stop | Self::Reset | Self::EmulOp |
            Self::MoveToSr | Self::AndiSr | Self::OriSr | Self::EoriSr
        )
    }
}

/// The kind of an addressing mode, without its register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EaMode {
    Drd,
    Ard,
    Ari,
    Ariwpo,
    Ariwpr,
    Ariwd,
    Ariwi,
    AbsShort,
    AbsLong,
    Pciwd,
    Pciwi,
    Immediate,
}

impl EaMode {
    /// Decodes the raw 3-bits mode and register fields. Returns None for the reserved encodings.
    pub const fn from_fields(mode: u16, reg: u16) -> Option<Self> {
        Some(match mode & 7 {
            0 => Self::Drd,
            1 => Self::Ard,
            2 => Self::Ari,
            3 => Self::Ariwpo,
            4 => Self::Ariwpr,
            5 => Self::Ariwd,
            6 => Self::Ariwi,
            _ => match reg & 7 {
                0 => Self::AbsShort,
                1 => Self::AbsLong,
                2 => Self::Pciwd,
                3 => Self::Pciwi,
                4 => Self::Immediate,
                _ => return None,
            },
        })
    }

    /// Creates the addressing mode with the given register.
    pub const fn with_register(self, reg: u8) -> AddressingMode {
        match self {
            Self::Drd => AddressingMode::Drd(reg),
            Self::Ard => AddressingMode::Ard(reg),
            Self::Ari => AddressingMode::Ari(reg),
            Self::Ariwpo => AddressingMode::Ariwpo(reg),
            Self::Ariwpr => AddressingMode::Ariwpr(reg),
            Self::Ariwd => AddressingMode::Ariwd(reg),
            Self::Ariwi => AddressingMode::Ariwi(reg),
            Self::AbsShort => AddressingMode::AbsShort,
            Self::AbsLong => AddressingMode::AbsLong,
            Self::Pciwd => AddressingMode::Pciwd,
            Self::Pciwi => AddressingMode::Pciwi,
            Self::Immediate => AddressingMode::Immediate,
        }
    }

    /// Returns true if the operand is in memory. Immediates are part of the instruction stream.
    pub const fn is_memory(self) -> bool {
        !matches!(self, Self::Drd | Self::Ard | Self::Immediate)
    }
}

/// Where an operand of the instruction comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandSpec {
    None,
    /// An addressing mode, with its register field starting at the given bit.
    Ea(EaMode, u8),
    /// 3-bits quick data at bits 9-11, where 0 means 8.
    Quick,
    /// Data embedded in the opcode (MOVEQ data, TRAP vector, branch displacement...).
    Data,
    /// Extension words read by the instruction itself (register lists, bit numbers, control fields...).
    Extension,
}

impl OperandSpec {
    /// Returns the addressing mode of the operand in the given opcode, if it has one.
    #[inline(always)]
    pub const fn addressing_mode(self, opcode: u16) -> Option<AddressingMode> {
        match self {
            Self::Ea(mode, pos) => Some(mode.with_register(bits(opcode, pos as u16, pos as u16 + 2) as u8)),
            _ => None,
        }
    }

    /// Returns true if the operand is an addressing mode that accesses memory.
    pub const fn is_memory(self) -> bool {
        match self {
            Self::Ea(mode, _) => mode.is_memory(),
            _ => false,
        }
    }
}

/// The privilege level required by an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Privilege {
    None,
    Supervisor,
    /// The word form is privileged (SR), the byte form is not (CCR).
    SupervisorIfWord,
}

/// Static description of an opcode pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpcodeDescriptor {
    pub isa: Isa,
    /// Operand size, None for unsized instructions.
    pub size: Option<Size>,
    pub src: OperandSpec,
    pub dst: OperandSpec,
    /// Condition tested by Bcc, DBcc, Scc and TRAPcc.
    pub condition: Option<u8>,
    pub privilege: Privilege,
    /// The first CPU level where this descriptor applies.
    pub cpu_level: u8,
    /// The CCR bits never written by the instruction.
    pub flags_unaffected: Ccr,
    /// The CCR bits written by the instruction when it completes.
    pub flags_set: Ccr,
    /// The CCR bits read by the instruction.
    pub flags_used: Ccr,
}

impl OpcodeDescriptor {
    /// The CCR bits the instruction is allowed to update.
    #[inline(always)]
    pub const fn flag_mask(&self) -> Ccr {
        self.flags_unaffected.complement()
    }

    /// Returns true if the instruction requires the supervisor mode.
    #[inline(always)]
    pub fn is_privileged(&self) -> bool {
        match self.privilege {
            Privilege::None => false,
            Privilege::Supervisor => true,
            Privilege::SupervisorIfWord => self.size == Some(Size::Word),
        }
    }

    /// The operand size, Long for the unsized instructions.
    #[inline(always)]
    pub fn size(&self) -> Size {
        self.size.unwrap_or(Size::Long)
    }
}

/// The table mapping every opcode word to its descriptors.
#[derive(Debug)]
pub struct DescriptorTable {
    descriptors: Vec<OpcodeDescriptor>,
    /// For each opcode, the indices plus one of the descriptors that claim it, highest CPU level first. 0 is empty.
    slots: Box<[[u16; 2]]>,
}

static TABLE: OnceLock<DescriptorTable> = OnceLock::new();

impl DescriptorTable {
    pub(crate) fn new(descriptors: Vec<OpcodeDescriptor>, slots: Box<[[u16; 2]]>) -> Self {
        assert_eq!(slots.len(), 65536);
        Self {
            descriptors,
            slots,
        }
    }

    /// Returns the table, building it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the patterns are inconsistent: two patterns claiming the same opcode at the same level,
    /// or a mnemonic without any opcode.
    pub fn get() -> &'static Self {
        TABLE.get_or_init(decoder::build)
    }

    /// Returns the descriptor of the opcode for the given CPU level, or None if it is illegal on this CPU.
    #[inline(always)]
    pub fn lookup(&self, opcode: u16, cpu_level: u8) -> Option<&OpcodeDescriptor> {
        for &id in &self.slots[opcode as usize] {
            if id == 0 {
                break;
            }

            let desc = &self.descriptors[id as usize - 1];
            if desc.cpu_level <= cpu_level {
                return Some(desc);
            }
        }

        None
    }

    /// The number of distinct descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterates over the distinct descriptors.
    pub fn descriptors(&self) -> impl Iterator<Item = &OpcodeDescriptor> {
        self.descriptors.iter()
    }
}

/// Returns the descriptor of the opcode for the given CPU level (0 to 4), or None if it is illegal on this CPU.
#[inline(always)]
pub fn lookup(opcode: u16, cpu_level: u8) -> Option<&'static OpcodeDescriptor> {
    DescriptorTable::get().lookup(opcode, cpu_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_fields_share_descriptors() {
        // ADD.W D1,D0 and ADD.W D7,D5
        let a = lookup(0xD041, 0).unwrap();
        let b = lookup(0xDA47, 0).unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.isa, Isa::Add);
        assert_eq!(a.size, Some(Size::Word));
        assert_eq!(a.src, OperandSpec::Ea(EaMode::Drd, 0));
        assert_eq!(a.dst, OperandSpec::Ea(EaMode::Drd, 9));

        // ADD.W (A1),D0 has another source mode.
        let c = lookup(0xD051, 0).unwrap();
        assert!(!std::ptr::eq(a, c));
    }

    #[test]
    fn levels_gate_opcodes() {
        // EXTB.L D0
        assert!(lookup(0x49C0, 1).is_none());
        assert_eq!(lookup(0x49C0, 2).unwrap().isa, Isa::Extb);

        // MOVE SR,D0 is privileged from the 68010.
        assert_eq!(lookup(0x40C0, 0).unwrap().privilege, Privilege::None);
        assert_eq!(lookup(0x40C0, 1).unwrap().privilege, Privilege::Supervisor);
        assert_eq!(lookup(0x40C0, 4).unwrap().privilege, Privilege::Supervisor);
    }

    #[test]
    fn line_a_and_reserved_modes_are_illegal() {
        for level in 0..=4 {
            assert!(lookup(0xA000, level).is_none());
            assert!(lookup(0xA9F0, level).is_none());
            // MOVE.W D0,mode 7 register 5
            assert!(lookup(0x3BC0, level).is_none());
        }
    }

    #[test]
    fn ccr_and_sr_forms() {
        let ccr = lookup(0x003C, 0).unwrap();
        let sr = lookup(0x007C, 0).unwrap();
        assert_eq!(ccr.isa, Isa::OriSr);
        assert!(!ccr.is_privileged());
        assert!(sr.is_privileged());
    }
}
