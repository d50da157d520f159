// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds the descriptor table from opcode patterns.
//!
//! A pattern is a 16 characters binary string, where letters are variable fields. Each field is replaced by
//! every value of its value list, in the order of appearance. A run of 6 uppercase letters is an effective
//! address field stored register first (the MOVE destination).

use crate::instruction::Size;
use crate::isa::{DescriptorTable, EaMode, Isa, OpcodeDescriptor, OperandSpec, Privilege};
use crate::status_register::{Ccr, StatusRegister};
use crate::utils::{bit, bits};

use bitflags::bitflags;

use std::collections::HashMap;

bitflags! {
    /// Sets of addressing modes accepted by an effective address field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct EaClass: u16 {
        const DRD = 1 << 0;
        const ARD = 1 << 1;
        const ARI = 1 << 2;
        const ARIWPO = 1 << 3;
        const ARIWPR = 1 << 4;
        const ARIWD = 1 << 5;
        const ARIWI = 1 << 6;
        const ABS_SHORT = 1 << 7;
        const ABS_LONG = 1 << 8;
        const PCIWD = 1 << 9;
        const PCIWI = 1 << 10;
        const IMMEDIATE = 1 << 11;

        const ALL = 0x0FFF;
        const DATA = Self::ALL.bits() & !Self::ARD.bits();
        const MEMORY = Self::DATA.bits() & !Self::DRD.bits();
        const CONTROL = Self::ARI.bits() | Self::ARIWD.bits() | Self::ARIWI.bits() |
            Self::ABS_SHORT.bits() | Self::ABS_LONG.bits() | Self::PCIWD.bits() | Self::PCIWI.bits();
        const ALTERABLE = Self::ALL.bits() & !(Self::PCIWD.bits() | Self::PCIWI.bits() | Self::IMMEDIATE.bits());
        const DATA_ALTERABLE = Self::ALTERABLE.bits() & !Self::ARD.bits();
        const MEMORY_ALTERABLE = Self::DATA_ALTERABLE.bits() & !Self::DRD.bits();
        const CONTROL_ALTERABLE = Self::CONTROL.bits() & Self::ALTERABLE.bits();
        const PC_RELATIVE = Self::PCIWD.bits() | Self::PCIWI.bits();
        const MOVEM_STORE = Self::CONTROL_ALTERABLE.bits() | Self::ARIWPR.bits();
        const MOVEM_LOAD = Self::CONTROL.bits() | Self::ARIWPO.bits();
    }
}

impl EaClass {
    const fn contains_mode(self, mode: EaMode) -> bool {
        self.bits() & 1 << mode as u16 != 0
    }
}

/// Returns the 6-bits effective address values (mode << 3 | register) accepted by the given class.
fn ea(class: EaClass) -> Vec<u8> {
    (0..64u8)
        .filter(|&v| EaMode::from_fields(v as u16 >> 3, v as u16 & 7).is_some_and(|m| class.contains_mode(m)))
        .collect()
}

const fn range<const N: usize>(start: u8) -> [u8; N] {
    let mut values = [0; N];
    let mut i = 0;
    while i < N {
        values[i] = start + i as u8;
        i += 1;
    }
    values
}

const V0_1: [u8; 2] = range(0);
const V0_3: [u8; 4] = range(0);
const V0_7: [u8; 8] = range(0);
const V0_15: [u8; 16] = range(0);
const V0_63: [u8; 64] = range(0);
const V1_2: [u8; 2] = range(1);
const V1_3: [u8; 3] = range(1);
const V2_15: [u8; 14] = range(2);
const VBYTE: [u8; 256] = range(0);
const SIZES: [u8; 3] = range(0);

/// How the size of the operation is encoded.
#[derive(Clone, Copy, Debug)]
enum SizeField {
    None,
    Fixed(Size),
    /// 00 byte, 01 word, 10 long at bits 6-7.
    Bits6,
    /// 0 word, 1 long at bit 6.
    Bit6,
    /// 0 word, 1 long at bit 8.
    Bit8,
    /// 01 byte, 11 word, 10 long at bits 12-13.
    Move,
    /// 00 byte, 01 word, 10 long at bits 9-10.
    Bits9,
    /// 01 byte, 10 word, 11 long at bits 9-10.
    Cas,
    /// 0 byte (CCR), 1 word (SR) at bit 6.
    CcrSr,
    /// Long on data registers, byte in memory.
    BitOp,
}

impl SizeField {
    fn decode(self, opcode: u16) -> Option<Size> {
        match self {
            Self::None => None,
            Self::Fixed(size) => Some(size),
            Self::Bits6 => Size::from_bits(bits(opcode, 6, 7)),
            Self::Bit6 => Some(Size::from_bit(bits(opcode, 6, 6))),
            Self::Bit8 => Some(Size::from_bit(bits(opcode, 8, 8))),
            Self::Move => Size::from_move(bits(opcode, 12, 13)),
            Self::Bits9 => Size::from_bits(bits(opcode, 9, 10)),
            Self::Cas => Size::from_bits(bits(opcode, 9, 10).wrapping_sub(1)),
            Self::CcrSr => Some(if bit(opcode, 6) { Size::Word } else { Size::Byte }),
            Self::BitOp => Some(if bits(opcode, 3, 5) == 0 { Size::Long } else { Size::Byte }),
        }
    }
}

/// Where an operand is encoded in the opcode.
#[derive(Clone, Copy, Debug)]
enum Field {
    None,
    /// Effective address at bits 0-5.
    Ea,
    /// Effective address at bits 6-11, register first.
    MoveDst,
    /// The given mode with its register at the given bit.
    Reg(EaMode, u8),
    Quick,
    Data,
    Extension,
}

impl Field {
    fn decode(self, opcode: u16) -> OperandSpec {
        match self {
            Self::None => OperandSpec::None,
            Self::Ea => ea_spec(bits(opcode, 3, 5), bits(opcode, 0, 2), 0, opcode),
            Self::MoveDst => ea_spec(bits(opcode, 6, 8), bits(opcode, 9, 11), 9, opcode),
            Self::Reg(mode, pos) => OperandSpec::Ea(mode, pos),
            Self::Quick => OperandSpec::Quick,
            Self::Data => OperandSpec::Data,
            Self::Extension => OperandSpec::Extension,
        }
    }
}

fn ea_spec(mode: u16, reg: u16, pos: u8, opcode: u16) -> OperandSpec {
    match EaMode::from_fields(mode, reg) {
        Some(mode) => OperandSpec::Ea(mode, pos),
        None => panic!("Pattern generated the reserved addressing mode of opcode {opcode:#06X}"),
    }
}

/// What a pattern decodes to.
#[derive(Clone, Copy, Debug)]
struct Template {
    isa: Isa,
    size: SizeField,
    src: Field,
    dst: Field,
    condition: bool,
    privilege: Privilege,
    level: u8,
    set: Ccr,
    used: Ccr,
}

const fn t(isa: Isa) -> Template {
    let (set, used) = default_flags(isa);
    Template {
        isa,
        size: SizeField::None,
        src: Field::None,
        dst: Field::None,
        condition: false,
        privilege: Privilege::None,
        level: 0,
        set,
        used,
    }
}

impl Template {
    const fn size(mut self, size: SizeField) -> Self {
        self.size = size;
        self
    }

    const fn fixed(self, size: Size) -> Self {
        self.size(SizeField::Fixed(size))
    }

    const fn src(mut self, src: Field) -> Self {
        self.src = src;
        self
    }

    const fn dst(mut self, dst: Field) -> Self {
        self.dst = dst;
        self
    }

    const fn cond(mut self) -> Self {
        self.condition = true;
        self
    }

    const fn supervisor(mut self) -> Self {
        self.privilege = Privilege::Supervisor;
        self
    }

    const fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    const fn flags(mut self, set: Ccr, used: Ccr) -> Self {
        self.set = set;
        self.used = used;
        self
    }

    fn descriptor(&self, opcode: u16) -> OpcodeDescriptor {
        let used = if self.condition {
            StatusRegister::condition_flags(bits(opcode, 8, 11) as u8)
        } else {
            self.used
        };

        OpcodeDescriptor {
            isa: self.isa,
            size: self.size.decode(opcode),
            src: self.src.decode(opcode),
            dst: self.dst.decode(opcode),
            condition: self.condition.then(|| bits(opcode, 8, 11) as u8),
            privilege: self.privilege,
            cpu_level: self.level,
            flags_unaffected: self.set.complement(),
            flags_set: self.set,
            flags_used: used,
        }
    }
}

/// The flags written and read by the common form of each instruction.
const fn default_flags(isa: Isa) -> (Ccr, Ccr) {
    const NONE: Ccr = Ccr::empty();
    const NZVC: Ccr = Ccr::NZVC;
    const ALL: Ccr = Ccr::ALL;
    const XZ: Ccr = Ccr::X.union(Ccr::Z);

    match isa {
        Isa::Add | Isa::Addi | Isa::Addq | Isa::Sub | Isa::Subi | Isa::Subq | Isa::Neg |
        Isa::Asl | Isa::Asr | Isa::Lsl | Isa::Lsr => (ALL, NONE),
        Isa::Addx | Isa::Subx | Isa::Negx => (ALL, XZ),
        Isa::Roxl | Isa::Roxr => (ALL, Ccr::X),
        // N and V are left alone on the 68040.
        Isa::Abcd | Isa::Sbcd | Isa::Nbcd => (ALL, ALL),
        Isa::And | Isa::Andi | Isa::Or | Isa::Ori | Isa::Eor | Isa::Eori | Isa::Not |
        Isa::Move | Isa::Moveq | Isa::Clr | Isa::Tst | Isa::Tas | Isa::Swap | Isa::Ext | Isa::Extb |
        Isa::Mulu | Isa::Muls | Isa::Mull | Isa::Divu | Isa::Divs | Isa::Divl |
        Isa::Cmp | Isa::Cmpa | Isa::Cmpi | Isa::Cmpm | Isa::Cas | Isa::Cas2 |
        Isa::Rol | Isa::Ror |
        Isa::Bftst | Isa::Bfextu | Isa::Bfexts | Isa::Bfffo | Isa::Bfchg | Isa::Bfclr | Isa::Bfset | Isa::Bfins => (NZVC, NONE),
        Isa::Btst | Isa::Bchg | Isa::Bclr | Isa::Bset => (Ccr::Z, NONE),
        Isa::Chk2 => (Ccr::Z.union(Ccr::C), NONE),
        // N is only written when the trap is taken.
        Isa::Chk => (NONE, Ccr::N),
        Isa::MoveToCcr | Isa::MoveToSr | Isa::Rtr | Isa::Rte | Isa::Stop => (ALL, NONE),
        Isa::AndiSr | Isa::OriSr | Isa::EoriSr | Isa::EmulOp => (ALL, ALL),
        Isa::MoveFromSr | Isa::MoveFromCcr => (NONE, ALL),
        Isa::Trapv => (NONE, Ccr::V),
        _ => (NONE, NONE),
    }
}

/// A field of a pattern.
#[derive(Clone, Copy, Debug)]
struct Placeholder {
    shift: u16,
    width: u16,
    /// 6-bits effective address stored register first.
    swapped: bool,
}

impl Placeholder {
    fn place(self, value: u8) -> u16 {
        let value = if self.swapped {
            (value as u16 & 7) << 3 | value as u16 >> 3
        } else {
            value as u16
        };
        assert!(value < 1 << self.width, "Value {value} does not fit in a {} bits field", self.width);
        value << self.shift
    }
}

/// Generates the opcodes of the given format, replacing each field by the values in `values`.
///
/// e.g. with format = "01010000000000ab" and values = [[0, 1], [1]]
/// will generate the opcodes `0101000000000001` and `0101000000000011`.
fn expand(format: &str, values: &[&[u8]]) -> Vec<u16> {
    let format = format.as_bytes();
    assert_eq!(format.len(), 16, "Invalid pattern length");

    let mut base = 0u16;
    let mut fields = Vec::new();
    let mut i = 0;
    while i < 16 {
        let c = format[i];
        match c {
            b'0' => i += 1,
            b'1' => {
                base |= 1 << (15 - i);
                i += 1;
            },
            _ => {
                let start = i;
                while i < 16 && format[i] == c {
                    i += 1;
                }
                let width = (i - start) as u16;
                fields.push(Placeholder {
                    shift: 16 - i as u16,
                    width,
                    swapped: c.is_ascii_uppercase(),
                });
            },
        }
    }
    assert_eq!(fields.len(), values.len(), "Pattern fields and value lists mismatch");

    let mut opcodes = vec![base];
    for (field, values) in fields.iter().zip(values) {
        opcodes = opcodes.iter()
            .flat_map(|&opcode| values.iter().map(move |&v| opcode | field.place(v)))
            .collect();
    }
    opcodes
}

struct Builder {
    descriptors: Vec<OpcodeDescriptor>,
    interned: HashMap<OpcodeDescriptor, u16>,
    slots: Vec<[u16; 2]>,
}

impl Builder {
    fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            interned: HashMap::new(),
            slots: vec![[0; 2]; 65536],
        }
    }

    fn intern(&mut self, desc: OpcodeDescriptor) -> u16 {
        if let Some(&id) = self.interned.get(&desc) {
            return id;
        }

        self.descriptors.push(desc);
        let id = self.descriptors.len() as u16;
        self.interned.insert(desc, id);
        id
    }

    /// Claims every opcode of the pattern.
    fn generate(&mut self, format: &str, values: &[&[u8]], template: Template) {
        for opcode in expand(format, values) {
            let desc = template.descriptor(opcode);
            let id = self.intern(desc);
            let slot = &mut self.slots[opcode as usize];

            match *slot {
                [0, _] => slot[0] = id,
                [first, 0] => {
                    let other = self.descriptors[first as usize - 1].cpu_level;
                    assert_ne!(other, desc.cpu_level, "Two patterns claim opcode {opcode:#06X} at level {other}");
                    if other > desc.cpu_level {
                        slot[1] = id;
                    } else {
                        *slot = [id, first];
                    }
                },
                _ => panic!("Too many patterns claim opcode {opcode:#06X}"),
            }
        }
    }

    fn finish(self) -> DescriptorTable {
        let mut seen = [false; Isa::_Size as usize];
        for desc in &self.descriptors {
            seen[desc.isa as usize] = true;
        }
        for (isa, seen) in seen.iter().enumerate() {
            assert!(seen, "No opcode decodes to mnemonic #{isa}");
        }

        DescriptorTable::new(self.descriptors, self.slots.into_boxed_slice())
    }
}

/// Builds the descriptor table of the 68000 to 68040.
pub(crate) fn build() -> DescriptorTable {
    use Field::{Data, Ea, Extension, MoveDst, Quick, Reg};
    use SizeField::{Bit6, Bit8, BitOp, Bits6, Bits9, Cas, CcrSr, Move};

    let all = ea(EaClass::ALL);
    let data = ea(EaClass::DATA);
    let memory_alterable = ea(EaClass::MEMORY_ALTERABLE);
    let data_alterable = ea(EaClass::DATA_ALTERABLE);
    let control = ea(EaClass::CONTROL);
    let pc_relative_immediate = ea(EaClass::PC_RELATIVE | EaClass::IMMEDIATE);
    let pc_relative = ea(EaClass::PC_RELATIVE);
    let data_no_immediate = ea(EaClass::DATA.difference(EaClass::IMMEDIATE));
    let movem_store = ea(EaClass::MOVEM_STORE);
    let movem_load = ea(EaClass::MOVEM_LOAD);
    let bf_read = ea(EaClass::DRD | EaClass::CONTROL);
    let bf_write = ea(EaClass::DRD | EaClass::CONTROL_ALTERABLE);

    let dn = |pos| Reg(EaMode::Drd, pos);
    let an = |pos| Reg(EaMode::Ard, pos);
    let predec = |pos| Reg(EaMode::Ariwpr, pos);
    let imm = Reg(EaMode::Immediate, 0);

    let mut b = Builder::new();

    // Immediate arithmetic and logic.
    for (format, isa, sr_format, sr_isa) in [
        ("00000000aabbbbbb", Isa::Ori, Some("000000000a111100"), Isa::OriSr),
        ("00000010aabbbbbb", Isa::Andi, Some("000000100a111100"), Isa::AndiSr),
        ("00000100aabbbbbb", Isa::Subi, None, Isa::Subi),
        ("00000110aabbbbbb", Isa::Addi, None, Isa::Addi),
        ("00001010aabbbbbb", Isa::Eori, Some("000010100a111100"), Isa::EoriSr),
        ("00001100aabbbbbb", Isa::Cmpi, None, Isa::Cmpi),
    ] {
        b.generate(format, &[&SIZES, &data_alterable], t(isa).size(Bits6).src(imm).dst(Ea));
        if let Some(sr_format) = sr_format {
            let mut template = t(sr_isa).size(CcrSr).src(imm);
            template.privilege = Privilege::SupervisorIfWord;
            b.generate(sr_format, &[&V0_1], template);
        }
    }
    b.generate("00001100aabbbbbb", &[&SIZES, &pc_relative], t(Isa::Cmpi).size(Bits6).src(imm).dst(Ea).level(2));

    // Static and dynamic bit operations.
    b.generate("0000100000aaaaaa", &[&data_no_immediate], t(Isa::Btst).size(BitOp).src(Extension).dst(Ea));
    b.generate("0000100001aaaaaa", &[&data_alterable], t(Isa::Bchg).size(BitOp).src(Extension).dst(Ea));
    b.generate("0000100010aaaaaa", &[&data_alterable], t(Isa::Bclr).size(BitOp).src(Extension).dst(Ea));
    b.generate("0000100011aaaaaa", &[&data_alterable], t(Isa::Bset).size(BitOp).src(Extension).dst(Ea));
    b.generate("0000aaa100bbbbbb", &[&V0_7, &data], t(Isa::Btst).size(BitOp).src(dn(9)).dst(Ea));
    b.generate("0000aaa101bbbbbb", &[&V0_7, &data_alterable], t(Isa::Bchg).size(BitOp).src(dn(9)).dst(Ea));
    b.generate("0000aaa110bbbbbb", &[&V0_7, &data_alterable], t(Isa::Bclr).size(BitOp).src(dn(9)).dst(Ea));
    b.generate("0000aaa111bbbbbb", &[&V0_7, &data_alterable], t(Isa::Bset).size(BitOp).src(dn(9)).dst(Ea));

    b.generate("0000aaa10b001ccc", &[&V0_7, &V0_1, &V0_7], t(Isa::Movep).size(Bit6).src(Reg(EaMode::Ariwd, 0)).dst(dn(9)));
    b.generate("0000aaa11b001ccc", &[&V0_7, &V0_1, &V0_7], t(Isa::Movep).size(Bit6).src(dn(9)).dst(Reg(EaMode::Ariwd, 0)));

    b.generate("00000aa011bbbbbb", &[&[0, 1, 2], &control], t(Isa::Chk2).size(Bits9).src(Ea).dst(Extension).level(2));
    b.generate("00001aa011bbbbbb", &[&V1_3, &memory_alterable], t(Isa::Cas).size(Cas).src(Extension).dst(Ea).level(2));
    b.generate("00001aa011111100", &[&[2, 3]], t(Isa::Cas2).size(Cas).src(Extension).level(2));
    b.generate("00001110aabbbbbb", &[&SIZES, &memory_alterable], t(Isa::Moves).size(Bits6).src(Extension).dst(Ea).supervisor().level(1));

    // MOVE and MOVEA.
    b.generate("0001AAAAAAbbbbbb", &[&data_alterable, &data], t(Isa::Move).size(Move).src(Ea).dst(MoveDst));
    b.generate("0011AAAAAAbbbbbb", &[&data_alterable, &all], t(Isa::Move).size(Move).src(Ea).dst(MoveDst));
    b.generate("0010AAAAAAbbbbbb", &[&data_alterable, &all], t(Isa::Move).size(Move).src(Ea).dst(MoveDst));
    b.generate("0011aaa001bbbbbb", &[&V0_7, &all], t(Isa::Movea).size(Move).src(Ea).dst(an(9)));
    b.generate("0010aaa001bbbbbb", &[&V0_7, &all], t(Isa::Movea).size(Move).src(Ea).dst(an(9)));

    // Line 4.
    b.generate("01000000aabbbbbb", &[&SIZES, &data_alterable], t(Isa::Negx).size(Bits6).dst(Ea));
    b.generate("0100000011aaaaaa", &[&data_alterable], t(Isa::MoveFromSr).fixed(Size::Word).dst(Ea));
    b.generate("0100000011aaaaaa", &[&data_alterable], t(Isa::MoveFromSr).fixed(Size::Word).dst(Ea).supervisor().level(1));
    b.generate("0100001011aaaaaa", &[&data_alterable], t(Isa::MoveFromCcr).fixed(Size::Word).dst(Ea).level(1));
    b.generate("0100aaa110bbbbbb", &[&V0_7, &data], t(Isa::Chk).fixed(Size::Word).src(Ea).dst(dn(9)));
    b.generate("0100aaa100bbbbbb", &[&V0_7, &data], t(Isa::Chk).fixed(Size::Long).src(Ea).dst(dn(9)).level(2));
    b.generate("0100aaa111bbbbbb", &[&V0_7, &control], t(Isa::Lea).fixed(Size::Long).src(Ea).dst(an(9)));
    b.generate("01000010aabbbbbb", &[&SIZES, &data_alterable], t(Isa::Clr).size(Bits6).dst(Ea));
    b.generate("01000100aabbbbbb", &[&SIZES, &data_alterable], t(Isa::Neg).size(Bits6).dst(Ea));
    b.generate("0100010011aaaaaa", &[&data], t(Isa::MoveToCcr).fixed(Size::Word).src(Ea));
    b.generate("01000110aabbbbbb", &[&SIZES, &data_alterable], t(Isa::Not).size(Bits6).dst(Ea));
    b.generate("0100011011aaaaaa", &[&data], t(Isa::MoveToSr).fixed(Size::Word).src(Ea).supervisor());
    b.generate("0100100000aaaaaa", &[&data_alterable], t(Isa::Nbcd).fixed(Size::Byte).dst(Ea));
    b.generate("0100100000001aaa", &[&V0_7], t(Isa::Link).fixed(Size::Long).src(an(0)).dst(Extension).level(2));
    b.generate("0100100001000aaa", &[&V0_7], t(Isa::Swap).fixed(Size::Long).dst(dn(0)));
    b.generate("0100100001001aaa", &[&V0_7], t(Isa::Bkpt).src(Data).level(1));
    b.generate("0100100001aaaaaa", &[&control], t(Isa::Pea).fixed(Size::Long).src(Ea));
    b.generate("0100100010000aaa", &[&V0_7], t(Isa::Ext).fixed(Size::Word).dst(dn(0)));
    b.generate("0100100011000aaa", &[&V0_7], t(Isa::Ext).fixed(Size::Long).dst(dn(0)));
    b.generate("0100100111000aaa", &[&V0_7], t(Isa::Extb).fixed(Size::Long).dst(dn(0)).level(2));
    b.generate("010010001abbbbbb", &[&V0_1, &movem_store], t(Isa::Movem).size(Bit6).src(Extension).dst(Ea));
    b.generate("01001010aabbbbbb", &[&SIZES, &data_alterable], t(Isa::Tst).size(Bits6).src(Ea));
    b.generate("01001010aabbbbbb", &[&SIZES, &pc_relative_immediate], t(Isa::Tst).size(Bits6).src(Ea).level(2));
    b.generate("01001010aa001bbb", &[&V1_2, &V0_7], t(Isa::Tst).size(Bits6).src(Ea).level(2));
    b.generate("0100101011aaaaaa", &[&data_alterable], t(Isa::Tas).fixed(Size::Byte).dst(Ea));
    b.generate("0100101011111100", &[], t(Isa::Illegal));
    b.generate("0100110000aaaaaa", &[&data], t(Isa::Mull).fixed(Size::Long).src(Ea).dst(Extension).level(2));
    b.generate("0100110001aaaaaa", &[&data], t(Isa::Divl).fixed(Size::Long).src(Ea).dst(Extension).level(2));
    b.generate("010011001abbbbbb", &[&V0_1, &movem_load], t(Isa::Movem).size(Bit6).src(Ea).dst(Extension));
    b.generate("010011100100aaaa", &[&V0_15], t(Isa::Trap).src(Data));
    b.generate("0100111001010aaa", &[&V0_7], t(Isa::Link).fixed(Size::Word).src(an(0)).dst(Extension));
    b.generate("0100111001011aaa", &[&V0_7], t(Isa::Unlk).dst(an(0)));
    b.generate("0100111001100aaa", &[&V0_7], t(Isa::MoveUsp).fixed(Size::Long).src(an(0)).supervisor());
    b.generate("0100111001101aaa", &[&V0_7], t(Isa::MoveUsp).fixed(Size::Long).dst(an(0)).supervisor());
    b.generate("0100111001110000", &[], t(Isa::Reset).supervisor());
    b.generate("0100111001110001", &[], t(Isa::Nop));
    b.generate("0100111001110010", &[], t(Isa::Stop).src(Extension).supervisor());
    b.generate("0100111001110011", &[], t(Isa::Rte).supervisor());
    b.generate("0100111001110100", &[], t(Isa::Rtd).src(Extension).level(1));
    b.generate("0100111001110101", &[], t(Isa::Rts));
    b.generate("0100111001110110", &[], t(Isa::Trapv));
    b.generate("0100111001110111", &[], t(Isa::Rtr));
    b.generate("010011100111101a", &[&V0_1], t(Isa::Movec).fixed(Size::Long).src(Extension).supervisor().level(1));
    b.generate("0100111010aaaaaa", &[&control], t(Isa::Jsr).src(Ea));
    b.generate("0100111011aaaaaa", &[&control], t(Isa::Jmp).src(Ea));

    // Line 5.
    b.generate("0101aaa0bbcccccc", &[&V0_7, &SIZES, &data_alterable], t(Isa::Addq).size(Bits6).src(Quick).dst(Ea));
    b.generate("0101aaa1bbcccccc", &[&V0_7, &SIZES, &data_alterable], t(Isa::Subq).size(Bits6).src(Quick).dst(Ea));
    b.generate("0101aaa0bb001ccc", &[&V0_7, &V1_2, &V0_7], t(Isa::Addq).size(Bits6).src(Quick).dst(Ea).flags(Ccr::empty(), Ccr::empty()));
    b.generate("0101aaa1bb001ccc", &[&V0_7, &V1_2, &V0_7], t(Isa::Subq).size(Bits6).src(Quick).dst(Ea).flags(Ccr::empty(), Ccr::empty()));
    b.generate("0101aaaa11bbbbbb", &[&V0_15, &data_alterable], t(Isa::Scc).fixed(Size::Byte).dst(Ea).cond());
    b.generate("0101aaaa11001bbb", &[&V0_15, &V0_7], t(Isa::Dbcc).fixed(Size::Word).src(dn(0)).dst(Extension).cond());
    b.generate("0101aaaa11111010", &[&V0_15], t(Isa::Trapcc).fixed(Size::Word).src(Extension).cond().level(2));
    b.generate("0101aaaa11111011", &[&V0_15], t(Isa::Trapcc).fixed(Size::Long).src(Extension).cond().level(2));
    b.generate("0101aaaa11111100", &[&V0_15], t(Isa::Trapcc).cond().level(2));

    // Line 6.
    b.generate("01100000aaaaaaaa", &[&VBYTE], t(Isa::Bra).src(Data));
    b.generate("01100001aaaaaaaa", &[&VBYTE], t(Isa::Bsr).src(Data));
    b.generate("0110aaaabbbbbbbb", &[&V2_15, &VBYTE], t(Isa::Bcc).src(Data).cond());

    // Line 7.
    b.generate("0111aaa0bbbbbbbb", &[&V0_7, &VBYTE], t(Isa::Moveq).fixed(Size::Long).src(Data).dst(dn(9)));
    b.generate("0111000100aaaaaa", &[&V0_63], t(Isa::EmulOp).src(Data));

    // Lines 8, 9, B, C and D.
    for (line, or_isa, div_isa, bcd_isa, alt_isa) in [
        ("1000", Isa::Or, Some((Isa::Divu, Isa::Divs)), Some(Isa::Sbcd), None),
        ("1100", Isa::And, Some((Isa::Mulu, Isa::Muls)), Some(Isa::Abcd), None),
        ("1001", Isa::Sub, None, None, Some((Isa::Suba, Isa::Subx))),
        ("1101", Isa::Add, None, None, Some((Isa::Adda, Isa::Addx))),
    ] {
        let pattern = |rest: &str| format!("{line}{rest}");
        if let Some((unsigned, signed)) = div_isa {
            b.generate(&pattern("aaa011bbbbbb"), &[&V0_7, &data], t(unsigned).fixed(Size::Word).src(Ea).dst(dn(9)));
            b.generate(&pattern("aaa111bbbbbb"), &[&V0_7, &data], t(signed).fixed(Size::Word).src(Ea).dst(dn(9)));
        }

        // <ea>,Dn
        b.generate(&pattern("aaa0bbcccccc"), &[&V0_7, &SIZES, &data], t(or_isa).size(Bits6).src(Ea).dst(dn(9)));
        // Dn,<ea>
        b.generate(&pattern("aaa1bbcccccc"), &[&V0_7, &SIZES, &memory_alterable], t(or_isa).size(Bits6).src(dn(9)).dst(Ea));

        if let Some(bcd) = bcd_isa {
            b.generate(&pattern("aaa100000bbb"), &[&V0_7, &V0_7], t(bcd).fixed(Size::Byte).src(dn(0)).dst(dn(9)));
            b.generate(&pattern("aaa100001bbb"), &[&V0_7, &V0_7], t(bcd).fixed(Size::Byte).src(predec(0)).dst(predec(9)));
        }

        if let Some((address, extend)) = alt_isa {
            b.generate(&pattern("aaa0bb001ccc"), &[&V0_7, &V1_2, &V0_7], t(or_isa).size(Bits6).src(Ea).dst(dn(9)));
            b.generate(&pattern("aaab11cccccc"), &[&V0_7, &V0_1, &all], t(address).size(Bit8).src(Ea).dst(an(9)));
            b.generate(&pattern("aaa1bb000ccc"), &[&V0_7, &SIZES, &V0_7], t(extend).size(Bits6).src(dn(0)).dst(dn(9)));
            b.generate(&pattern("aaa1bb001ccc"), &[&V0_7, &SIZES, &V0_7], t(extend).size(Bits6).src(predec(0)).dst(predec(9)));
        }
    }
    b.generate("1000aaa101000bbb", &[&V0_7, &V0_7], t(Isa::Pack).src(dn(0)).dst(dn(9)).level(2));
    b.generate("1000aaa101001bbb", &[&V0_7, &V0_7], t(Isa::Pack).src(predec(0)).dst(predec(9)).level(2));
    b.generate("1000aaa110000bbb", &[&V0_7, &V0_7], t(Isa::Unpk).src(dn(0)).dst(dn(9)).level(2));
    b.generate("1000aaa110001bbb", &[&V0_7, &V0_7], t(Isa::Unpk).src(predec(0)).dst(predec(9)).level(2));

    b.generate("1011aaa0bbcccccc", &[&V0_7, &SIZES, &data], t(Isa::Cmp).size(Bits6).src(Ea).dst(dn(9)));
    b.generate("1011aaa0bb001ccc", &[&V0_7, &V1_2, &V0_7], t(Isa::Cmp).size(Bits6).src(Ea).dst(dn(9)));
    b.generate("1011aaab11cccccc", &[&V0_7, &V0_1, &all], t(Isa::Cmpa).size(Bit8).src(Ea).dst(an(9)));
    b.generate("1011aaa1bbcccccc", &[&V0_7, &SIZES, &data_alterable], t(Isa::Eor).size(Bits6).src(dn(9)).dst(Ea));
    b.generate("1011aaa1bb001ccc", &[&V0_7, &SIZES, &V0_7], t(Isa::Cmpm).size(Bits6).src(Reg(EaMode::Ariwpo, 0)).dst(Reg(EaMode::Ariwpo, 9)));

    b.generate("1100aaa101000bbb", &[&V0_7, &V0_7], t(Isa::Exg).fixed(Size::Long).src(dn(9)).dst(dn(0)));
    b.generate("1100aaa101001bbb", &[&V0_7, &V0_7], t(Isa::Exg).fixed(Size::Long).src(an(9)).dst(an(0)));
    b.generate("1100aaa110001bbb", &[&V0_7, &V0_7], t(Isa::Exg).fixed(Size::Long).src(dn(9)).dst(an(0)));

    // Line E: shifts and rotates, then bit fields.
    for (kind, right, left, right_roll, left_roll) in [
        (0, Isa::Asr, Isa::Asl, "1110000011aaaaaa", "1110000111aaaaaa"),
        (1, Isa::Lsr, Isa::Lsl, "1110001011aaaaaa", "1110001111aaaaaa"),
        (2, Isa::Roxr, Isa::Roxl, "1110010011aaaaaa", "1110010111aaaaaa"),
        (3, Isa::Ror, Isa::Rol, "1110011011aaaaaa", "1110011111aaaaaa"),
    ] {
        let kind = [kind];
        for (direction, isa) in [(0, right), (1, left)] {
            let quick = t(isa).size(Bits6).src(Quick).dst(dn(0));
            // A count of 0 leaves X alone.
            let (set, used) = default_flags(isa);
            let register = t(isa).size(Bits6).src(dn(9)).dst(dn(0)).flags(set, used.union(Ccr::X));
            let format = if direction == 0 { "1110aaa0bb0ccddd" } else { "1110aaa1bb0ccddd" };
            b.generate(format, &[&V0_7, &SIZES, &kind, &V0_7], quick);
            let format = if direction == 0 { "1110aaa0bb1ccddd" } else { "1110aaa1bb1ccddd" };
            b.generate(format, &[&V0_7, &SIZES, &kind, &V0_7], register);
        }
        b.generate(right_roll, &[&memory_alterable], t(right).fixed(Size::Word).dst(Ea));
        b.generate(left_roll, &[&memory_alterable], t(left).fixed(Size::Word).dst(Ea));
    }

    for (format, isa, class) in [
        ("1110100011aaaaaa", Isa::Bftst, &bf_read),
        ("1110100111aaaaaa", Isa::Bfextu, &bf_read),
        ("1110101011aaaaaa", Isa::Bfchg, &bf_write),
        ("1110101111aaaaaa", Isa::Bfexts, &bf_read),
        ("1110110011aaaaaa", Isa::Bfclr, &bf_write),
        ("1110110111aaaaaa", Isa::Bfffo, &bf_read),
        ("1110111011aaaaaa", Isa::Bfset, &bf_write),
        ("1110111111aaaaaa", Isa::Bfins, &bf_write),
    ] {
        b.generate(format, &[class], t(isa).src(Extension).dst(Ea).level(2));
    }

    // Line F: 68040 cache, MMU and MOVE16. Everything else goes to the FPU or the Line F exception.
    b.generate("11110100aabccddd", &[&V0_3, &V0_1, &V1_3, &V0_7], t(Isa::Cinv).supervisor().level(4));
    b.generate("11110101000aabbb", &[&V0_3, &V0_7], t(Isa::Pflush).supervisor().level(4));
    b.generate("1111011000100aaa", &[&V0_7], t(Isa::Move16).src(Reg(EaMode::Ariwpo, 0)).dst(Extension).level(4));
    b.generate("11110110000aabbb", &[&V0_3, &V0_7], t(Isa::Move16).src(Extension).dst(Reg(EaMode::Ari, 0)).level(4));

    b.finish()
}

/// Returns the number of extension words the instruction reads by itself, outside of its addressing modes.
fn extension_words(desc: &OpcodeDescriptor, opcode: u16, level: u8) -> u32 {
    match desc.isa {
        Isa::Cas2 => 2,
        Isa::Link if desc.size == Some(Size::Long) => 2,
        Isa::Pack | Isa::Unpk => 1,
        Isa::Move16 if opcode & 0x0020 == 0 => 2,
        Isa::Trapcc => match desc.size {
            Some(Size::Long) => 2,
            Some(_) => 1,
            None => 0,
        },
        Isa::Bra | Isa::Bsr | Isa::Bcc => match opcode & 0xFF {
            0 => 1,
            0xFF if level >= 2 => 2,
            _ => 0,
        },
        _ => (desc.src == OperandSpec::Extension || desc.dst == OperandSpec::Extension) as u32,
    }
}

/// Returns the number of extension words used by an addressing mode, or None if the stream ended.
fn ea_words<F: FnMut(u32) -> Option<u16>>(mode: EaMode, size: Size, level: u8, at: u32, words: &mut F) -> Option<u32> {
    Some(match mode {
        EaMode::Drd | EaMode::Ard | EaMode::Ari | EaMode::Ariwpo | EaMode::Ariwpr => 0,
        EaMode::Ariwd | EaMode::Pciwd | EaMode::AbsShort => 1,
        EaMode::AbsLong => 2,
        EaMode::Immediate => if size.is_long() { 2 } else { 1 },
        EaMode::Ariwi | EaMode::Pciwi => {
            let ext = words(at)?;
            if level < 2 || ext & 0x0100 == 0 {
                1
            } else {
                let displacement = |size: u16| match size {
                    2 => 1,
                    3 => 2,
                    _ => 0,
                };
                1 + displacement(bits(ext, 4, 5)) + displacement(bits(ext, 0, 1))
            }
        },
    })
}

/// Computes the length in bytes of the instruction, reading its extension words with `words`,
/// which takes the index of the word after the opcode and returns None past the end of the stream.
pub(crate) fn instruction_length<F: FnMut(u32) -> Option<u16>>(desc: &OpcodeDescriptor, opcode: u16, level: u8, mut words: F) -> Option<u32> {
    let mut count = extension_words(desc, opcode, level);
    let size = desc.size();

    for spec in [desc.src, desc.dst] {
        if let OperandSpec::Ea(mode, _) = spec {
            count += ea_words(mode, size, level, count, &mut words)?;
        }
    }

    Some(2 + count * 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::lookup;

    #[test]
    fn expand_fills_fields_in_order() {
        let opcodes = expand("01010000000000ab", &[&[0, 1], &[1]]);
        assert_eq!(opcodes, [0b0101_0000_0000_0001, 0b0101_0000_0000_0011]);
    }

    #[test]
    fn uppercase_fields_are_swapped() {
        // Mode 2 register 3 stored register first.
        let opcodes = expand("0001AAAAAA000000", &[&[0b010_011]]);
        assert_eq!(opcodes, [0b0001_011_010_000000]);
    }

    #[test]
    fn ea_classes() {
        assert_eq!(ea(EaClass::ALL).len(), 61);
        assert_eq!(ea(EaClass::DATA_ALTERABLE).len(), 50);
        assert_eq!(ea(EaClass::CONTROL).len(), 28);
        assert_eq!(ea(EaClass::MEMORY_ALTERABLE).len(), 42);
    }

    #[test]
    fn lengths() {
        let no_words = |_: u32| None::<u16>;
        let words = |ext: u16| move |_: u32| Some(ext);

        // MOVE.L #imm,(d16,A0)
        let desc = lookup(0x217C, 0).unwrap();
        assert_eq!(instruction_length(desc, 0x217C, 0, no_words), Some(8));

        // ADDQ.B #1,D0
        let desc = lookup(0x5200, 0).unwrap();
        assert_eq!(instruction_length(desc, 0x5200, 0, no_words), Some(2));

        // MOVEM.L D0-D7,-(A7)
        let desc = lookup(0x48E7, 0).unwrap();
        assert_eq!(instruction_length(desc, 0x48E7, 0, no_words), Some(4));

        // TST.W ([bd.l,A0],od.w): full extension word with long base and word outer displacement.
        let desc = lookup(0x4A70, 2).unwrap();
        assert_eq!(instruction_length(desc, 0x4A70, 2, words(0x0132)), Some(2 + 2 + 4 + 2));
        assert_eq!(instruction_length(desc, 0x4A70, 2, no_words), None);
    }
}
