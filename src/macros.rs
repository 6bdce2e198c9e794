// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Internal logging macros. With the `log` feature they forward to the `log`
//! crate, otherwise they expand to nothing so that the hot loops of the
//! producer, workers and collector don't pay for formatting.

#[cfg(feature = "log")]
macro_rules! log_debug {
    ( $($args:tt)* ) => {
        log::debug!( $($args)* )
    }
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ( $($args:tt)* ) => {
        log::warn!( $($args)* )
    }
}

#[cfg(feature = "log")]
macro_rules! log_error {
    ( $($args:tt)* ) => {
        log::error!( $($args)* )
    }
}

// Per-call statistics and per-item traces are noisy, so they sit behind their
// own feature.
#[cfg(feature = "log_parallelism")]
macro_rules! log_info {
    ( $($args:tt)* ) => {
        log::info!( $($args)* )
    }
}

#[cfg(feature = "log_parallelism")]
macro_rules! log_trace {
    ( $($args:tt)* ) => {
        log::trace!( $($args)* )
    }
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ( $($args:tt)* ) => {
        ()
    };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ( $($args:tt)* ) => {
        ()
    };
}

#[cfg(not(feature = "log"))]
macro_rules! log_error {
    ( $($args:tt)* ) => {
        ()
    };
}

#[cfg(not(feature = "log_parallelism"))]
macro_rules! log_trace {
    ( $($args:tt)* ) => {
        ()
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
#[cfg(feature = "log_parallelism")]
pub(crate) use log_info;
pub(crate) use log_trace;
pub(crate) use log_warn;
