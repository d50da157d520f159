// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Benchmark of single stepping against block execution on a tight loop.
//!
//! Make sure the result of the benchmarked function is used,
//! whether by sending it to black_box, or to return it from the closure.

use core::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use m68k_core::{Config, Cpu, CpuLevel, MemoryAccess, MemoryError, NoHost};
use m68k_core::dead_flags::Block;

const CODE: u32 = 0x1000;

const LOOP: [u16; 7] = [
    0x7001, // MOVEQ #1,D0
    0xD280, // ADD.L D0,D1
    0xD280, // ADD.L D0,D1
    0x5382, // SUBQ.L #1,D2
    0xD983, // ADDX.L D3,D4
    0xB481, // CMP.L D1,D2
    0x66F2, // BNE.S -14
];

struct Ram(Box<[u8]>);

impl MemoryAccess for Ram {
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError> {
        self.0.get(addr as usize).copied().ok_or(MemoryError::BusError(addr))
    }

    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryError> {
        Ok((self.read_u8(addr)? as u16) << 8 | self.read_u8(addr.wrapping_add(1))? as u16)
    }

    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        let byte = self.0.get_mut(addr as usize).ok_or(MemoryError::BusError(addr))?;
        *byte = value;
        Ok(())
    }

    fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write_u8(addr, (value >> 8) as u8)?;
        self.write_u8(addr.wrapping_add(1), value as u8)
    }
}

fn setup() -> (Cpu, Ram) {
    let mut ram = Ram(vec![0; 0x10000].into_boxed_slice());
    ram.write_u32(0, 0x8000).unwrap();
    ram.write_u32(4, CODE).unwrap();
    for (i, word) in LOOP.iter().enumerate() {
        ram.write_u16(CODE + i as u32 * 2, *word).unwrap();
    }

    let mut cpu = Cpu::new(Config { cpu_level: CpuLevel::Mc68020, ..Config::default() }).unwrap();
    cpu.reset(&mut ram).unwrap();
    cpu.regs.d[2] = u32::MAX;
    (cpu, ram)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("loop step", |b|
        b.iter_batched(setup, |(mut cpu, mut ram)| {
            for _ in 0..1_000_000 {
                black_box(cpu.step(&mut ram).unwrap());
            }
        }, criterion::BatchSize::SmallInput)
    );

    c.bench_function("loop run", |b|
        b.iter_batched(setup, |(mut cpu, mut ram)| {
            black_box(cpu.run(&mut ram, &mut NoHost, 1_000_000).unwrap());
        }, criterion::BatchSize::SmallInput)
    );

    c.bench_function("loop run_block", |b|
        b.iter_batched(setup, |(mut cpu, mut ram)| {
            let block = Block::decode(&mut ram, CODE, 2, 32);
            for _ in 0..1_000_000 / LOOP.len() {
                black_box(cpu.run_block(&mut ram, &mut NoHost, &block).unwrap());
            }
        }, criterion::BatchSize::SmallInput)
    );
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
