// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flat memory and CPU setup shared by the integration tests.

#![allow(dead_code)]

use m68k_core::{Config, Cpu, CpuLevel, MemoryAccess, MemoryError};

pub const MEM_SIZE: usize = 0x10000;
pub const INITIAL_SSP: u32 = 0x8000;
pub const CODE: u32 = 0x1000;
/// Exception handlers are at `HANDLERS + vector * 4`.
pub const HANDLERS: u32 = 0x4000;
/// Accesses at or above this address fail as host errors.
pub const HOST_FAILURE: u32 = 0xF000;

/// 64KB of RAM. Accesses beyond it are bus errors.
pub struct Memory {
    pub bytes: Vec<u8>,
    pub resets: usize,
}

impl Memory {
    pub fn new() -> Self {
        let mut memory = Self { bytes: vec![0; MEM_SIZE], resets: 0 };
        memory.set_long(0, INITIAL_SSP);
        memory.set_long(4, CODE);
        for vector in 2..256 {
            memory.set_long(vector * 4, handler(vector as u8));
            // Every handler is a NOP by default.
            memory.set_word(handler(vector as u8), 0x4E71);
        }
        memory
    }

    pub fn word(&self, addr: u32) -> u16 {
        let a = addr as usize;
        u16::from_be_bytes([self.bytes[a], self.bytes[a + 1]])
    }

    pub fn long(&self, addr: u32) -> u32 {
        (self.word(addr) as u32) << 16 | self.word(addr + 2) as u32
    }

    pub fn set_word(&mut self, addr: u32, value: u16) {
        let a = addr as usize;
        self.bytes[a..a + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn set_long(&mut self, addr: u32, value: u32) {
        self.set_word(addr, (value >> 16) as u16);
        self.set_word(addr + 2, value as u16);
    }

    pub fn load(&mut self, addr: u32, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.set_word(addr + i as u32 * 2, *word);
        }
    }

    fn check(addr: u32, len: u32) -> Result<usize, MemoryError> {
        if addr >= HOST_FAILURE && addr < MEM_SIZE as u32 {
            Err(MemoryError::Host(addr))
        } else if addr as usize + len as usize > MEM_SIZE {
            Err(MemoryError::BusError(addr))
        } else {
            Ok(addr as usize)
        }
    }
}

impl MemoryAccess for Memory {
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError> {
        let a = Self::check(addr, 1)?;
        Ok(self.bytes[a])
    }

    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryError> {
        let a = Self::check(addr, 2)?;
        Ok(u16::from_be_bytes([self.bytes[a], self.bytes[a + 1]]))
    }

    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        let a = Self::check(addr, 1)?;
        self.bytes[a] = value;
        Ok(())
    }

    fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryError> {
        let a = Self::check(addr, 2)?;
        self.bytes[a..a + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

pub const fn handler(vector: u8) -> u32 {
    HANDLERS + vector as u32 * 4
}

/// A reset CPU of the given level, with the program loaded at [CODE].
pub fn setup(cpu_level: CpuLevel, program: &[u16]) -> (Cpu, Memory) {
    setup_with(Config { cpu_level, ..Config::default() }, program)
}

pub fn setup_with(config: Config, program: &[u16]) -> (Cpu, Memory) {
    let mut memory = Memory::new();
    memory.load(CODE, program);
    let mut cpu = Cpu::new(config).unwrap();
    cpu.reset(&mut memory).unwrap();
    (cpu, memory)
}
