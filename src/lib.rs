// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

mod cancel;
mod core;
mod error;
pub mod iter;
mod macros;
mod map;

pub use cancel::{CancellationToken, DropGuard};
pub use crate::core::CpuPinningPolicy;
pub use error::Error;
pub use map::{parallel_map, ParallelMap, ParallelMapBuilder, WorkerCount};

/// A prelude module, to bring the extension trait and the builder types into
/// scope.
pub mod prelude {
    pub use crate::iter::ParallelMapExt;
    pub use crate::{CancellationToken, CpuPinningPolicy, ParallelMapBuilder, WorkerCount};
}
