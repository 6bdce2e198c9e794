// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error type returned by a parallel map.

use thiserror::Error;

/// Error returned by [`ParallelMap::run()`](crate::ParallelMap::run) and
/// [`parallel_map()`](crate::parallel_map), where `E` is the error type of the
/// transform function.
///
/// Exactly one error is reported per call. When several transform invocations
/// fail concurrently, the reported one is the first that the collecting thread
/// observed, which isn't necessarily the one with the smallest input index.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// The requested number of workers was zero.
    #[error("the number of workers must be positive")]
    InvalidWorkers,
    /// The caller's cancellation token fired, either before the call or while
    /// items were still being processed.
    #[error("the parallel map was cancelled")]
    Cancelled,
    /// A transform invocation failed. The error is the exact value returned by
    /// the transform function.
    #[error("{0}")]
    Transform(E),
    /// A worker or producer thread couldn't be spawned.
    #[error("failed to spawn a thread: {0}")]
    Threads(#[source] std::io::Error),
}

impl<E> Error<E> {
    /// Returns the transform error, if that's what this error is.
    pub fn into_transform(self) -> Option<E> {
        match self {
            Error::Transform(e) => Some(e),
            _ => None,
        }
    }

    /// Returns whether this error is the result of a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
