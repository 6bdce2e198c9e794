// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const NUM_WORKERS: &[usize] = &[1, 2, 4, 8];
const LENGTHS: &[usize] = &[100, 1_000, 10_000];

/// Number of rounds of the busy transform, to simulate a non-trivial amount of
/// work per item.
const BUSY_ROUNDS: u64 = 1_000;

fn busy(x: u64) -> Result<u64, String> {
    let mut h = x;
    for i in 0..BUSY_ROUNDS {
        h = (h ^ i).wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17);
    }
    Ok(h)
}

fn double(x: u64) -> Result<u64, String> {
    Ok(x * 2)
}

fn map_double(c: &mut Criterion) {
    bench_transform(c, "double", double);
}

fn map_busy(c: &mut Criterion) {
    bench_transform(c, "busy", busy);
}

fn bench_transform(c: &mut Criterion, name: &str, f: fn(u64) -> Result<u64, String>) {
    let mut group = c.benchmark_group(name);
    for len in LENGTHS {
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("serial", len), len, |bencher, len| {
            serial::map(bencher, len, f)
        });
        for &num_workers in NUM_WORKERS {
            group.bench_with_input(
                BenchmarkId::new(format!("rayon@{num_workers}"), len),
                len,
                |bencher, len| rayon::map(bencher, num_workers, len, f),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("parmap@{num_workers}"), len),
                len,
                |bencher, len| parmap::map(bencher, num_workers, len, f),
            );
        }
    }
    group.finish();
}

/// Baseline benchmarks using serial iterators (without any multi-threading
/// involved).
mod serial {
    use criterion::{black_box, Bencher};

    pub fn map(bencher: &mut Bencher, len: &usize, f: fn(u64) -> Result<u64, String>) {
        let input = (0..*len as u64).collect::<Vec<u64>>();
        let input_slice = input.as_slice();
        bencher.iter(|| {
            black_box(input_slice)
                .iter()
                .map(|&x| f(x))
                .collect::<Result<Vec<u64>, String>>()
        });
    }
}

/// Benchmarks using Rayon.
mod rayon {
    use criterion::{black_box, Bencher};
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    pub fn map(
        bencher: &mut Bencher,
        num_workers: usize,
        len: &usize,
        f: fn(u64) -> Result<u64, String>,
    ) {
        let input = (0..*len as u64).collect::<Vec<u64>>();
        let input_slice = input.as_slice();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .unwrap();
        thread_pool.install(|| {
            bencher.iter(|| {
                black_box(input_slice)
                    .par_iter()
                    .map(|&x| f(x))
                    .collect::<Result<Vec<u64>, String>>()
            })
        });
    }
}

/// Benchmarks using this library.
mod parmap {
    use criterion::{black_box, Bencher};
    use parmap::prelude::*;

    pub fn map(
        bencher: &mut Bencher,
        num_workers: usize,
        len: &usize,
        f: fn(u64) -> Result<u64, String>,
    ) {
        let input = (0..*len as u64).collect::<Vec<u64>>();
        let input_slice = input.as_slice();
        let parallel_map = ParallelMapBuilder {
            num_workers: WorkerCount::try_from(num_workers).unwrap(),
            ..Default::default()
        }
        .build()
        .unwrap();
        let cancel = CancellationToken::new();
        bencher.iter(|| {
            black_box(input_slice)
                .iter()
                .try_par_map(&parallel_map, &cancel, |_, &x| f(x))
        });
    }
}

criterion_group!(benches, map_double, map_busy);
criterion_main!(benches);
