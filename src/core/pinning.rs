// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pinning of worker threads to CPUs.

#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use crate::macros::log_debug;
use crate::macros::log_warn;
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::io;

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    #[default]
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. Building a
    /// [`ParallelMap`](crate::ParallelMap) fails if CPU pinning isn't supported
    /// on this platform, and a worker thread panics if it can't be pinned.
    Always,
}

/// Whether CPU pinning is implemented on this platform.
pub(crate) const fn is_supported() -> bool {
    cfg!(all(
        not(miri),
        any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        )
    ))
}

impl CpuPinningPolicy {
    /// Checks that this policy can be honored on this platform.
    pub(crate) fn validate(self) -> io::Result<()> {
        match self {
            CpuPinningPolicy::Always if !is_supported() => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Pinning threads to CPUs is not implemented on this platform.",
            )),
            CpuPinningPolicy::IfSupported if !is_supported() => {
                log_warn!("Pinning threads to CPUs is not implemented on this platform.");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Pins the calling worker thread to the CPU of the same index, according
    /// to this policy.
    #[cfg(all(
        not(miri),
        any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        )
    ))]
    pub(crate) fn pin_current_thread(self, id: usize) {
        let pin = || -> nix::Result<()> {
            let mut cpu_set = CpuSet::new();
            cpu_set.set(id)?;
            sched_setaffinity(Pid::from_raw(0), &cpu_set)
        };
        match self {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => match pin() {
                Ok(()) => log_debug!("[worker {id}] Pinned to CPU #{id}"),
                Err(_e) => log_warn!("[worker {id}] Failed to set CPU affinity: {_e}"),
            },
            CpuPinningPolicy::Always => match pin() {
                Ok(()) => log_debug!("[worker {id}] Pinned to CPU #{id}"),
                Err(e) => panic!("Failed to set CPU affinity for worker #{id}: {e}"),
            },
        }
    }

    /// Pins the calling worker thread to the CPU of the same index, according
    /// to this policy.
    #[cfg(any(
        miri,
        not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        ))
    ))]
    pub(crate) fn pin_current_thread(self, _id: usize) {
        // Unsupported policies are rejected or reported by `validate()`.
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(CpuPinningPolicy::No.validate().is_ok());
        assert!(CpuPinningPolicy::IfSupported.validate().is_ok());
        assert_eq!(CpuPinningPolicy::Always.validate().is_ok(), is_supported());
    }

    #[test]
    fn test_pin_if_supported_never_panics() {
        std::thread::spawn(|| CpuPinningPolicy::IfSupported.pin_current_thread(usize::MAX / 2))
            .join()
            .unwrap();
    }

    #[cfg(all(
        not(miri),
        any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        )
    ))]
    #[test]
    #[should_panic = "Failed to set CPU affinity for worker"]
    fn test_pin_always_out_of_range() {
        CpuPinningPolicy::Always.pin_current_thread(usize::MAX / 2);
    }
}
