// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 68020 bit field instructions, PACK and UNPK.
//!
//! A bit field is given by an offset and a width (1 to 32). Offset 0 is the most significant bit of the
//! base byte in memory, or of the data register. In memory the offset is signed and can reach any byte,
//! in a register it is taken modulo 32 and the field wraps around.

use crate::{Cpu, MemoryAccess};
use crate::addressing_modes::AddressingMode;
use crate::exception::Fault;
use crate::instruction::Size;
use crate::interpreter::InterpreterResult;
use crate::isa::{Isa, OpcodeDescriptor};
use crate::status_register::Ccr;
use crate::utils::{bit, bits};

/// Where the field is.
#[derive(Clone, Copy, Debug)]
enum Location {
    Register(u8),
    /// Byte address of the first byte and bit offset (0-7) in it.
    Memory(u32, u32),
}

/// A decoded bit field operand.
#[derive(Clone, Copy, Debug)]
struct BitField {
    location: Location,
    /// The offset as given by the instruction, for BFFFO.
    offset: u32,
    width: u32,
    /// For memory fields: the bytes spanned, left-aligned in a 64-bits value.
    raw: u64,
}

impl BitField {
    /// Number of bytes spanned by a memory field.
    const fn span(bit_offset: u32, width: u32) -> u32 {
        (bit_offset + width + 7) / 8
    }

    const fn mask(width: u32) -> u32 {
        u32::MAX >> (32 - width)
    }
}

impl Cpu {
    /// Decodes the bit field extension word and reads the field.
    fn read_bit_field<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, ext: u16) -> Result<(BitField, u32), Fault> {
        let offset = if bit(ext, 11) {
            self.regs.d[bits(ext, 6, 8) as usize]
        } else {
            bits(ext, 6, 10) as u32
        };
        let width = if bit(ext, 5) {
            self.regs.d[bits(ext, 0, 2) as usize] & 31
        } else {
            bits(ext, 0, 4) as u32
        };
        let width = if width == 0 { 32 } else { width };

        match self.ea_mode(self.current_opcode)? {
            AddressingMode::Drd(reg) => {
                let value = self.regs.d[reg as usize].rotate_left(offset % 32) >> (32 - width);
                let field = BitField { location: Location::Register(reg), offset, width, raw: 0 };
                Ok((field, value & BitField::mask(width)))
            },
            mode => {
                let base = self.control_address(memory, mode)?;
                let addr = base.wrapping_add((offset as i32 >> 3) as u32);
                let bit_offset = offset & 7;

                let mut raw = 0u64;
                for i in 0..BitField::span(bit_offset, width) {
                    let byte = self.read(memory, addr.wrapping_add(i), Size::Byte)? as u64;
                    raw |= byte << (56 - i * 8);
                }

                let value = (raw << bit_offset >> (64 - width)) as u32;
                let field = BitField { location: Location::Memory(addr, bit_offset), offset, width, raw };
                Ok((field, value))
            },
        }
    }

    /// Writes the field back with the given value.
    fn write_bit_field<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, field: &BitField, value: u32) -> InterpreterResult {
        let mask = BitField::mask(field.width);
        let value = value & mask;

        match field.location {
            Location::Register(reg) => {
                let shift = 32 - field.width;
                let rotate = field.offset % 32;
                let d = self.regs.d[reg as usize].rotate_left(rotate);
                let d = d & !(mask << shift) | value << shift;
                self.regs.d[reg as usize] = d.rotate_right(rotate);
                Ok(())
            },
            Location::Memory(addr, bit_offset) => {
                let shift = 64 - field.width - bit_offset;
                let raw = field.raw & !((mask as u64) << shift) | (value as u64) << shift;
                for i in 0..BitField::span(bit_offset, field.width) {
                    let byte = (raw >> (56 - i * 8)) as u32 & 0xFF;
                    self.write(memory, addr.wrapping_add(i), Size::Byte, byte)?;
                }
                Ok(())
            },
        }
    }

    /// N from the most significant bit of the field, Z if the field is all zero, V and C cleared.
    fn bit_field_flags(&mut self, desc: &OpcodeDescriptor, value: u32, width: u32) {
        let mask = self.flag_mask(desc);
        self.regs.sr.set_flag(mask & Ccr::N, value >> (width - 1) & 1 != 0);
        self.regs.sr.set_flag(mask & Ccr::Z, value & BitField::mask(width) == 0);
        self.regs.sr.set_flag(mask & (Ccr::V | Ccr::C), false);
    }

    /// Every BFxxx instruction.
    pub(super) fn execute_bitfield<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, desc: &OpcodeDescriptor) -> InterpreterResult {
        let ext = self.get_next_word(memory)?;
        let (field, value) = self.read_bit_field(memory, ext)?;
        let width = field.width;
        let reg = bits(ext, 12, 14) as usize;

        if desc.isa == Isa::Bfins {
            let inserted = self.regs.d[reg] & BitField::mask(width);
            self.bit_field_flags(desc, inserted, width);
            return self.write_bit_field(memory, &field, inserted);
        }

        self.bit_field_flags(desc, value, width);

        match desc.isa {
            Isa::Bfextu => self.regs.d[reg] = value,
            Isa::Bfexts => self.regs.d[reg] = ((value << (32 - width)) as i32 >> (32 - width)) as u32,
            Isa::Bfffo => {
                let leading = (value << (32 - width)).leading_zeros().min(width);
                self.regs.d[reg] = field.offset.wrapping_add(leading);
            },
            Isa::Bfchg => return self.write_bit_field(memory, &field, !value),
            Isa::Bfclr => return self.write_bit_field(memory, &field, 0),
            Isa::Bfset => return self.write_bit_field(memory, &field, u32::MAX),
            _ => (),
        }

        Ok(())
    }

    pub(super) fn execute_pack<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let rx = bits(self.current_opcode, 9, 11) as u8;
        let ry = bits(self.current_opcode, 0, 2) as u8;

        if bit(self.current_opcode, 3) {
            let adjustment = self.get_next_word(memory)?;
            let addr = self.ariwpr(ry, Size::Byte);
            let low = self.read(memory, addr, Size::Byte)? as u16;
            let addr = self.ariwpr(ry, Size::Byte);
            let high = self.read(memory, addr, Size::Byte)? as u16;
            let value = (high << 8 | low).wrapping_add(adjustment);
            let addr = self.ariwpr(rx, Size::Byte);
            self.write(memory, addr, Size::Byte, (value >> 4 & 0xF0 | value & 0xF) as u32)
        } else {
            let adjustment = self.get_next_word(memory)?;
            let value = (self.regs.d[ry as usize] as u16).wrapping_add(adjustment);
            self.regs.d_byte(rx, (value >> 4 & 0xF0 | value & 0xF) as u8);
            Ok(())
        }
    }

    pub(super) fn execute_unpk<M: MemoryAccess + ?Sized>(&mut self, memory: &mut M, _: &OpcodeDescriptor) -> InterpreterResult {
        let rx = bits(self.current_opcode, 9, 11) as u8;
        let ry = bits(self.current_opcode, 0, 2) as u8;
        let unpack = |byte: u16| (byte << 4 & 0x0F00) | byte & 0xF;

        if bit(self.current_opcode, 3) {
            let adjustment = self.get_next_word(memory)?;
            let addr = self.ariwpr(ry, Size::Byte);
            let byte = self.read(memory, addr, Size::Byte)? as u16;
            let value = unpack(byte).wrapping_add(adjustment);
            let low = self.ariwpr(rx, Size::Byte);
            self.write(memory, low, Size::Byte, value as u32 & 0xFF)?;
            let high = self.ariwpr(rx, Size::Byte);
            self.write(memory, high, Size::Byte, (value >> 8) as u32)
        } else {
            let adjustment = self.get_next_word(memory)?;
            let value = unpack(self.regs.d[ry as usize] as u16 & 0xFF).wrapping_add(adjustment);
            self.regs.d_word(rx, value);
            Ok(())
        }
    }
}
