// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to run a parallel map over a range of numbers, with injected
//! failures, delays and cancellation.

use clap::{Parser, ValueEnum};
use parmap::prelude::*;
use parmap::Error;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::time::{Duration, Instant};

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let parallel_map = match (ParallelMapBuilder {
        num_workers: match cli.num_workers {
            Some(num_workers) => WorkerCount::Count(num_workers),
            None => WorkerCount::AvailableParallelism,
        },
        cpu_pinning: match cli.cpu_pinning {
            CpuPinningCli::No => CpuPinningPolicy::No,
            CpuPinningCli::IfSupported => CpuPinningPolicy::IfSupported,
            CpuPinningCli::Always => CpuPinningPolicy::Always,
        },
        thread_name: None,
    })
    .build()
    {
        Ok(parallel_map) => parallel_map,
        Err(e) => {
            eprintln!("failed to configure the parallel map: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let start = Instant::now();
    let result = std::thread::scope(|scope| {
        // Cancelled once the map returns, so that the timer thread exits early.
        let timer = cancel.child_token();
        if let Some(cancel_after_ms) = cli.cancel_after_ms {
            let timer = timer.clone();
            let cancel = &cancel;
            scope.spawn(move || {
                if !timer.wait_timeout(Duration::from_millis(cancel_after_ms)) {
                    cancel.cancel();
                }
            });
        }
        let _guard = timer.drop_guard();

        (0..cli.input_size).try_par_map(&parallel_map, &cancel, |token, x| {
            if cli.max_delay_us > 0 {
                let mut rng = ChaCha12Rng::seed_from_u64(x as u64);
                let delay = rng.random_range(0..cli.max_delay_us);
                if token.wait_timeout(Duration::from_micros(delay)) {
                    return Err(format!("aborted while processing {x}"));
                }
            }
            if cli.fail_at == Some(x) {
                return Err(format!("failed to process {x}"));
            }
            Ok(x as u64 * 2)
        })
    });
    let elapsed = start.elapsed();

    match result {
        Ok(output) => {
            let sum = output.iter().sum::<u64>();
            println!(
                "processed {} items with {} workers in {elapsed:?}, sum = {sum}",
                output.len(),
                parallel_map.num_workers()
            );
            ExitCode::SUCCESS
        }
        Err(Error::Transform(e)) => {
            println!("transform failed after {elapsed:?}: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("parallel map failed after {elapsed:?}: {e}");
            ExitCode::FAILURE
        }
    }
}

/// CLI tool to run a parallel map over a range of numbers.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(version)]
struct Cli {
    /// Number of worker threads. Default to the available parallelism.
    #[arg(long)]
    num_workers: Option<NonZeroUsize>,

    /// Policy to pin worker threads to CPUs.
    #[arg(long, value_enum, default_value_t = CpuPinningCli::No)]
    cpu_pinning: CpuPinningCli,

    /// Number of items in the input.
    #[arg(long, default_value_t = 10_000)]
    input_size: usize,

    /// Item whose transform fails, if any.
    #[arg(long)]
    fail_at: Option<usize>,

    /// Maximal pseudo-random delay of each transform, in microseconds.
    #[arg(long, default_value_t = 0)]
    max_delay_us: u64,

    /// Cancel the map after this many milliseconds.
    #[arg(long)]
    cancel_after_ms: Option<u64>,
}

/// Policy to pin worker threads to CPUs.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CpuPinningCli {
    /// Don't pin worker threads.
    No,
    /// Pin worker threads if supported.
    IfSupported,
    /// Pin worker threads, failing if not supported.
    Always,
}
