// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Cooperative cancellation tokens.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Message type of the signal channel. Nothing is ever sent on it: the channel
/// only gets disconnected, which wakes up every blocked receiver at once.
pub(crate) enum Never {}

/// A token to cooperatively cancel work running on other threads.
///
/// Cancelling a token is irreversible. Clones of a token share the same state,
/// and a [child token](Self::child_token) is cancelled whenever its parent is.
///
/// ```
/// # use parmap::CancellationToken;
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// child.cancel();
/// assert!(child.is_cancelled());
/// assert!(!parent.is_cancelled());
///
/// let other_child = parent.child_token();
/// parent.cancel();
/// assert!(other_child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    /// Fast path for [`CancellationToken::is_cancelled()`], polled by the
    /// producer and workers between items.
    cancelled: CachePadded<AtomicBool>,
    /// Receiving end of the signal channel, disconnected upon cancellation.
    done: Receiver<Never>,
    state: Mutex<TokenState>,
}

struct TokenState {
    /// Sending end of the signal channel, or [`None`] once cancelled.
    signal: Option<Sender<Never>>,
    /// Children to cancel along with this token. Dropped children are pruned
    /// lazily.
    children: Vec<Weak<TokenInner>>,
}

impl TokenInner {
    fn new() -> Self {
        let (signal, done) = crossbeam_channel::bounded(0);
        Self {
            cancelled: CachePadded::new(AtomicBool::new(false)),
            done,
            state: Mutex::new(TokenState {
                signal: Some(signal),
                children: Vec::new(),
            }),
        }
    }

    fn cancel(&self) {
        let children = {
            let mut state = self.state.lock().unwrap();
            let Some(signal) = state.signal.take() else {
                return;
            };
            // The flag must be visible before waking up the receivers.
            self.cancelled.store(true, Ordering::Release);
            drop(signal);
            std::mem::take(&mut state.children)
        };

        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

impl CancellationToken {
    /// Creates a new token, not cancelled yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    /// Cancels this token and all its descendants. Calling this more than once
    /// has no further effect.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns whether this token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Creates a token that is cancelled when this one is. Cancelling the child
    /// doesn't affect this token.
    ///
    /// If this token is already cancelled, the child is returned cancelled.
    pub fn child_token(&self) -> CancellationToken {
        let child = Arc::new(TokenInner::new());

        let mut state = self.inner.state.lock().unwrap();
        if state.signal.is_none() {
            drop(state);
            child.cancel();
        } else {
            state.children.retain(|c| c.strong_count() > 0);
            state.children.push(Arc::downgrade(&child));
        }

        CancellationToken { inner: child }
    }

    /// Blocks the current thread until this token is cancelled.
    pub fn wait(&self) {
        match self.inner.done.recv() {
            Ok(never) => match never {},
            Err(_) => (),
        }
    }

    /// Blocks the current thread until this token is cancelled or the timeout
    /// elapses. Returns whether the token was cancelled.
    ///
    /// This is the cooperative way for a transform function to wait: it
    /// returns early as soon as the map is aborted.
    ///
    /// ```
    /// # use parmap::CancellationToken;
    /// # use std::time::Duration;
    /// let token = CancellationToken::new();
    /// assert!(!token.wait_timeout(Duration::from_millis(1)));
    /// token.cancel();
    /// assert!(token.wait_timeout(Duration::from_secs(3600)));
    /// ```
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.done.recv_timeout(timeout) {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Returns a guard that cancels this token when dropped, unless
    /// [disarmed](DropGuard::disarm).
    pub fn drop_guard(self) -> DropGuard {
        DropGuard { token: Some(self) }
    }

    /// Receiver that becomes disconnected when this token is cancelled, to use
    /// in a [`crossbeam_channel::select!`].
    pub(crate) fn done(&self) -> &Receiver<Never> {
        &self.inner.done
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancels the wrapped [`CancellationToken`] when dropped.
#[must_use = "the token is cancelled as soon as the guard is dropped"]
pub struct DropGuard {
    token: Option<CancellationToken>,
}

impl DropGuard {
    /// Returns the wrapped token without cancelling it.
    pub fn disarm(mut self) -> CancellationToken {
        self.token
            .take()
            .expect("the token is only taken when the guard is consumed")
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent() {
        let parent = CancellationToken::new();
        parent.cancel();
        let child = parent.child_token();
        assert!(child.is_cancelled());
        assert!(child.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn test_cancel_propagates_to_grandchildren() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();
        let sibling = parent.child_token();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_propagate_up() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let sibling = parent.child_token();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());
    }

    #[test]
    fn test_dropped_children_are_pruned() {
        let parent = CancellationToken::new();
        for _ in 0..100 {
            drop(parent.child_token());
        }
        let _child = parent.child_token();
        assert_eq!(parent.inner.state.lock().unwrap().children.len(), 1);
    }

    #[test]
    fn test_wait_wakes_up_on_cancel() {
        let token = CancellationToken::new();
        let start = Instant::now();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                token.cancel();
            });
            token.wait();
        });
        assert!(token.is_cancelled());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_timeout_wakes_up_early() {
        let token = CancellationToken::new();
        let start = Instant::now();
        let cancelled = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(10));
                token.cancel();
            });
            token.wait_timeout(Duration::from_secs(60))
        });
        assert!(cancelled);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn test_drop_guard() {
        let token = CancellationToken::new();
        drop(token.clone().drop_guard());
        assert!(token.is_cancelled());

        let token = CancellationToken::new();
        let disarmed = token.clone().drop_guard().disarm();
        assert!(!token.is_cancelled());
        assert!(!disarmed.is_cancelled());
    }

    #[test]
    fn test_debug() {
        let token = CancellationToken::new();
        assert_eq!(
            format!("{token:?}"),
            "CancellationToken { is_cancelled: false }"
        );
    }
}
