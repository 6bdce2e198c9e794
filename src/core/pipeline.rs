// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Producer and worker loops, connected by rendezvous channels.

use super::pinning::CpuPinningPolicy;
use crate::cancel::CancellationToken;
use crate::macros::{log_debug, log_error, log_trace};
use crossbeam_channel::{select, Receiver, Sender};
#[cfg(feature = "log")]
use std::fmt;

/// An input item, tagged with its position in the input.
pub struct Job<T> {
    pub index: usize,
    pub value: T,
}

/// The result of the transform on the item at the given position.
pub struct Outcome<R, E> {
    pub index: usize,
    pub result: Result<R, E>,
}

/// Role of a thread spawned for a parallel map, used in log messages.
#[cfg(feature = "log")]
#[derive(Clone, Copy)]
pub enum Role {
    Producer,
    Worker(usize),
}

#[cfg(feature = "log")]
impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Worker(id) => write!(f, "worker {id}"),
        }
    }
}

/// Object whose destructor aborts the parallel map if the thread owning it is
/// panicking, so that the other threads stop instead of processing the
/// remaining items for nothing.
pub struct PanicNotifier<'a> {
    #[cfg(feature = "log")]
    pub role: Role,
    pub abort: &'a CancellationToken,
}

impl Drop for PanicNotifier<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log_error!(
                "[{}] Detected panic in this thread, aborting the parallel map",
                self.role
            );
            self.abort.cancel();
        }
    }
}

/// Feeds the input items to the workers, in order.
pub struct Producer<'a, T> {
    pub jobs: Sender<Job<T>>,
    pub abort: &'a CancellationToken,
}

impl<T> Producer<'_, T> {
    /// Offers each of the first `len` items to the workers, until the input is
    /// exhausted or the map is aborted. Dropping the job sender at the end
    /// lets the workers drain the channel and exit.
    pub fn run(self, input: impl Iterator<Item = T>, len: usize) {
        let _notifier = PanicNotifier {
            #[cfg(feature = "log")]
            role: Role::Producer,
            abort: self.abort,
        };

        let mut produced = 0;
        for (index, value) in input.take(len).enumerate() {
            if self.abort.is_cancelled() {
                log_debug!("[producer] Aborted after {produced} items");
                return;
            }
            let job = Job { index, value };
            select! {
                send(self.jobs, job) -> res => {
                    if res.is_err() {
                        // All the workers are gone, which only happens if they panicked.
                        log_debug!("[producer] No worker left after {produced} items");
                        return;
                    }
                }
                recv(self.abort.done()) -> _ => {
                    log_debug!("[producer] Aborted after {produced} items");
                    return;
                }
            }
            produced += 1;
        }

        assert_eq!(
            produced, len,
            "The input iterator yielded fewer items than its reported length"
        );
        log_debug!("[producer] Produced all {len} items");
    }
}

/// A worker thread's context: it takes jobs, runs the transform and sends the
/// outcome to the collector.
pub struct Worker<'a, T, F> {
    pub id: usize,
    pub jobs: Receiver<Job<T>>,
    pub abort: &'a CancellationToken,
    pub transform: &'a F,
    pub cpu_pinning: CpuPinningPolicy,
}

impl<T, F> Worker<'_, T, F> {
    /// Main function run by this worker. Returns the number of items that this
    /// worker transformed.
    pub fn run<R, E>(self, outcomes: Sender<Outcome<R, E>>) -> usize
    where
        F: Fn(&CancellationToken, T) -> Result<R, E>,
    {
        let id = self.id;
        let _notifier = PanicNotifier {
            #[cfg(feature = "log")]
            role: Role::Worker(id),
            abort: self.abort,
        };
        self.cpu_pinning.pin_current_thread(id);

        let mut processed = 0;
        loop {
            let job = select! {
                recv(self.jobs) -> msg => match msg {
                    Ok(job) => job,
                    Err(_) => break,
                },
                recv(self.abort.done()) -> _ => break,
            };
            // Both channels may have been ready, in which case the job is
            // dropped rather than starting a new transform after the abort.
            if self.abort.is_cancelled() {
                break;
            }

            log_trace!("[worker {id}] Processing item #{}", job.index);
            let result = (self.transform)(self.abort, job.value);
            processed += 1;

            let outcome = Outcome {
                index: job.index,
                result,
            };
            select! {
                send(outcomes, outcome) -> res => {
                    if res.is_err() {
                        break;
                    }
                }
                recv(self.abort.done()) -> _ => break,
            }
        }

        log_debug!("[worker {id}] Exiting after processing {processed} items");
        processed
    }
}
