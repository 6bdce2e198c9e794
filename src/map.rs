// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A parallel map with a bounded number of worker threads.

use crate::cancel::CancellationToken;
use crate::core::collector::Collector;
use crate::core::pipeline::{Job, Outcome, Producer, Worker};
use crate::core::CpuPinningPolicy;
use crate::error::Error;
use crate::macros::log_debug;
#[cfg(feature = "log_parallelism")]
use crate::macros::log_info;
use crossbeam_channel::bounded;
use std::io;
use std::num::NonZeroUsize;
use std::thread::Builder;

/// Number of worker threads to process items with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerCount {
    /// Use the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Use the given number of threads.
    Count(NonZeroUsize),
}

impl WorkerCount {
    /// Resolves the number of worker threads.
    pub fn count(self) -> io::Result<NonZeroUsize> {
        match self {
            WorkerCount::AvailableParallelism => std::thread::available_parallelism(),
            WorkerCount::Count(count) => Ok(count),
        }
    }
}

impl TryFrom<usize> for WorkerCount {
    type Error = <NonZeroUsize as TryFrom<usize>>::Error;

    fn try_from(worker_count: usize) -> Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(worker_count)?;
        Ok(WorkerCount::Count(count))
    }
}

/// A builder for [`ParallelMap`].
#[derive(Clone, Debug)]
pub struct ParallelMapBuilder {
    /// Maximal number of items transformed concurrently.
    pub num_workers: WorkerCount,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
    /// Prefix of the names given to the spawned threads. Defaults to
    /// `"parmap"`.
    pub thread_name: Option<String>,
}

impl Default for ParallelMapBuilder {
    fn default() -> Self {
        Self {
            num_workers: WorkerCount::AvailableParallelism,
            cpu_pinning: CpuPinningPolicy::No,
            thread_name: None,
        }
    }
}

impl ParallelMapBuilder {
    /// Builds a [`ParallelMap`].
    ///
    /// This fails if the available parallelism can't be determined, or if
    /// [`CpuPinningPolicy::Always`] is requested on a platform that doesn't
    /// support it.
    ///
    /// ```
    /// # use parmap::{CancellationToken, CpuPinningPolicy, ParallelMapBuilder, WorkerCount};
    /// let parallel_map = ParallelMapBuilder {
    ///     num_workers: WorkerCount::try_from(4).unwrap(),
    ///     cpu_pinning: CpuPinningPolicy::No,
    ///     thread_name: Some("squares".to_owned()),
    /// }
    /// .build()
    /// .unwrap();
    ///
    /// let squares = parallel_map
    ///     .run(&CancellationToken::new(), 1..6u32, |_, x| {
    ///         Ok::<_, std::convert::Infallible>(x * x)
    ///     })
    ///     .unwrap();
    /// assert_eq!(squares, [1, 4, 9, 16, 25]);
    /// ```
    pub fn build(&self) -> io::Result<ParallelMap> {
        self.cpu_pinning.validate()?;
        Ok(ParallelMap {
            num_workers: self.num_workers.count()?,
            cpu_pinning: self.cpu_pinning,
            thread_name: self
                .thread_name
                .clone()
                .unwrap_or_else(|| "parmap".to_owned()),
        })
    }
}

/// Applies a fallible transform to every item of an input on a bounded number
/// of worker threads, returning the outputs in input order.
///
/// The configuration can be reused across calls. Each call to
/// [`run()`](Self::run) spawns its own scoped threads and joins all of them
/// before returning.
#[derive(Clone, Debug)]
pub struct ParallelMap {
    num_workers: NonZeroUsize,
    cpu_pinning: CpuPinningPolicy,
    thread_name: String,
}

impl ParallelMap {
    /// Returns the maximal number of worker threads spawned by each call.
    pub fn num_workers(&self) -> NonZeroUsize {
        self.num_workers
    }

    /// Transforms every item of the input in parallel, returning the outputs
    /// in input order.
    ///
    /// At most [`num_workers()`](Self::num_workers) transform invocations run
    /// concurrently, and never more than the number of items. The transform
    /// receives a [`CancellationToken`] that fires as soon as the map is
    /// aborted, which long-running transforms should observe.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` was already cancelled (without
    ///   invoking the transform at all), or if it fires before any transform
    ///   fails and before all the items are processed.
    /// - [`Error::Transform`] with the first transform error observed. The
    ///   remaining items are then skipped, and invocations that are already
    ///   running finish before this returns.
    /// - [`Error::Threads`] if a thread couldn't be spawned.
    ///
    /// # Panics
    ///
    /// If the transform panics, the map is aborted and the panic is resumed on
    /// the calling thread once all the threads have exited.
    pub fn run<I, R, E, F>(
        &self,
        cancel: &CancellationToken,
        input: I,
        transform: F,
    ) -> Result<Vec<R>, Error<E>>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator + Send,
        I::Item: Send,
        R: Send,
        E: Send,
        F: Fn(&CancellationToken, I::Item) -> Result<R, E> + Sync,
    {
        let input = input.into_iter();
        let len = input.len();

        if cancel.is_cancelled() {
            log_debug!("[main thread] Cancelled before processing {len} items");
            return Err(Error::Cancelled);
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let num_workers = self.num_workers.get().min(len);

        // Fired by the caller through `cancel`, by the collector on the first
        // error, or when this function returns.
        let abort = cancel.child_token();
        let _guard = abort.clone().drop_guard();

        let (jobs_tx, jobs_rx) = bounded::<Job<I::Item>>(0);
        let (outcomes_tx, outcomes_rx) = bounded::<Outcome<R, E>>(0);

        log_debug!("[main thread] Processing {len} items with {num_workers} workers");
        std::thread::scope(|scope| {
            let mut spawn_error = None;

            let mut workers = Vec::with_capacity(num_workers);
            for id in 0..num_workers {
                let worker = Worker {
                    id,
                    jobs: jobs_rx.clone(),
                    abort: &abort,
                    transform: &transform,
                    cpu_pinning: self.cpu_pinning,
                };
                let outcomes = outcomes_tx.clone();
                let spawned = Builder::new()
                    .name(format!("{}-worker-{id}", self.thread_name))
                    .spawn_scoped(scope, move || worker.run(outcomes));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        spawn_error = Some(e);
                        break;
                    }
                }
            }
            // The outcome channel disconnects once all the workers have exited.
            drop(jobs_rx);
            drop(outcomes_tx);

            let producer = match spawn_error {
                Some(_) => None,
                None => {
                    let producer = Producer {
                        jobs: jobs_tx,
                        abort: &abort,
                    };
                    let spawned = Builder::new()
                        .name(format!("{}-producer", self.thread_name))
                        .spawn_scoped(scope, move || producer.run(input, len));
                    match spawned {
                        Ok(handle) => Some(handle),
                        Err(e) => {
                            spawn_error = Some(e);
                            None
                        }
                    }
                }
            };
            if spawn_error.is_some() {
                abort.cancel();
            }

            let mut collector = Collector::new(len, &abort);
            collector.drain(&outcomes_rx);

            let mut panic = None;
            if let Some(producer) = producer {
                if let Err(payload) = producer.join() {
                    panic.get_or_insert(payload);
                }
            }
            for (_id, worker) in workers.into_iter().enumerate() {
                match worker.join() {
                    Ok(_processed) => {
                        #[cfg(feature = "log_parallelism")]
                        log_info!("[main thread] Worker {_id} processed {_processed} items");
                    }
                    Err(payload) => {
                        panic.get_or_insert(payload);
                    }
                }
            }
            log_debug!("[main thread] Joined all threads");

            if let Some(payload) = panic {
                std::panic::resume_unwind(payload);
            }
            if let Some(e) = spawn_error {
                return Err(Error::Threads(e));
            }
            collector.finish()
        })
    }
}

/// Transforms every item of the input with at most `workers` concurrent
/// invocations of `transform`, returning the outputs in input order.
///
/// This is a one-shot shorthand for a [`ParallelMap`] with
/// [`WorkerCount::Count`] and no CPU pinning. A `workers` count of zero is
/// rejected with [`Error::InvalidWorkers`], whatever the input, before anything
/// else is checked.
///
/// ```
/// # use parmap::{parallel_map, CancellationToken, Error};
/// let cancel = CancellationToken::new();
/// let result = parallel_map(&cancel, 2, vec![1, 2, 3, 4, 5], |_, x| {
///     if x == 3 {
///         Err("value==3 failure")
///     } else {
///         Ok(x * 2)
///     }
/// });
/// assert!(matches!(result, Err(Error::Transform("value==3 failure"))));
///
/// let doubled = parallel_map(&cancel, 2, vec![1, 2, 4, 5], |_, x| Ok::<_, &str>(x * 2));
/// assert_eq!(doubled.unwrap(), [2, 4, 8, 10]);
/// ```
pub fn parallel_map<I, R, E, F>(
    cancel: &CancellationToken,
    workers: usize,
    input: I,
    transform: F,
) -> Result<Vec<R>, Error<E>>
where
    I: IntoIterator,
    I::IntoIter: ExactSizeIterator + Send,
    I::Item: Send,
    R: Send,
    E: Send,
    F: Fn(&CancellationToken, I::Item) -> Result<R, E> + Sync,
{
    let Some(num_workers) = NonZeroUsize::new(workers) else {
        return Err(Error::InvalidWorkers);
    };
    ParallelMap {
        num_workers,
        cpu_pinning: CpuPinningPolicy::No,
        thread_name: "parmap".to_owned(),
    }
    .run(cancel, input, transform)
}
