// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Collection of the workers' outcomes into an ordered output.

use super::pipeline::Outcome;
use crate::cancel::CancellationToken;
use crate::error::Error;
use crate::macros::log_debug;
use crossbeam_channel::{select, Receiver};

/// Gathers outcomes on the calling thread, placing each value at its input
/// index. The first error observed aborts the map.
pub struct Collector<'a, R, E> {
    /// One slot per input item, each written at most once.
    slots: Vec<Option<R>>,
    /// The error to report, if any. Once set, the slots are never written
    /// again.
    error: Option<Error<E>>,
    /// Number of slots written so far.
    filled: usize,
    abort: &'a CancellationToken,
    /// Number of outcomes discarded after the error was recorded.
    #[cfg_attr(not(feature = "log"), allow(dead_code))]
    discarded: usize,
}

impl<'a, R, E> Collector<'a, R, E> {
    /// Creates a collector for an input of the given length.
    pub fn new(len: usize, abort: &'a CancellationToken) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            error: None,
            filled: 0,
            abort,
            discarded: 0,
        }
    }

    /// Receives outcomes until all the workers are gone, i.e. until the
    /// channel is disconnected.
    pub fn drain(&mut self, outcomes: &Receiver<Outcome<R, E>>) {
        let abort = self.abort;
        while self.error.is_none() {
            select! {
                recv(outcomes) -> msg => match msg {
                    Ok(outcome) => self.accept(outcome),
                    Err(_) => return,
                },
                recv(abort.done()) -> _ => {
                    if self.filled == self.slots.len() {
                        // Every item was processed before the cancellation.
                        return;
                    }
                    log_debug!("[collector] Observed cancellation before any error");
                    self.record(Error::Cancelled);
                }
            }
        }

        // The abort signal is set: the remaining workers finish at most their
        // current item, whose outcome is thrown away.
        for outcome in outcomes.iter() {
            self.accept(outcome);
        }
        log_debug!(
            "[collector] Discarded {} outcomes after the first error",
            self.discarded
        );
    }

    /// Processes one outcome.
    pub fn accept(&mut self, outcome: Outcome<R, E>) {
        if self.error.is_some() {
            self.discarded += 1;
            return;
        }
        match outcome.result {
            Ok(value) => {
                let slot = &mut self.slots[outcome.index];
                debug_assert!(slot.is_none(), "index {} received twice", outcome.index);
                *slot = Some(value);
                self.filled += 1;
            }
            Err(e) => {
                log_debug!("[collector] Item #{} failed, aborting", outcome.index);
                self.record(Error::Transform(e));
            }
        }
    }

    /// Records the error to report and aborts the map.
    fn record(&mut self, error: Error<E>) {
        debug_assert!(self.error.is_none());
        self.error = Some(error);
        self.abort.cancel();
    }

    /// Returns the ordered output, or the recorded error.
    ///
    /// If no error was recorded but some slots are empty, the workers stopped
    /// early because the map was cancelled.
    pub fn finish(self) -> Result<Vec<R>, Error<E>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.slots
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or(Error::Cancelled)
    }
}
