// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Benchmark of the descriptor table lookup.

use core::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use m68k_core::isa::{self, DescriptorTable};

pub fn criterion_benchmark(c: &mut Criterion) {
    // Builds the table outside of the measurement.
    black_box(DescriptorTable::get());

    for level in [0, 2, 4] {
        c.bench_function(&format!("lookup all opcodes level {level}"), |b|
            b.iter(|| {
                let mut valid = 0usize;
                for opcode in 0..=u16::MAX {
                    if isa::lookup(black_box(opcode), level).is_some() {
                        valid += 1;
                    }
                }
                valid
            })
        );
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
