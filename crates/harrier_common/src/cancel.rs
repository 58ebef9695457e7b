//! Cooperative cancellation for long-running shard calls.
//!
//! `CancelToken` replaces bare `thread::sleep` retry loops with
//! Condvar-based waits that respond to cancellation within milliseconds.
//! A child token derived with `child()` is cancelled together with its
//! parent, but cancelling the child leaves the parent untouched — the
//! message-stream executor uses this to tear down sibling shard streams
//! without disturbing the caller's token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    flag: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
    children: Mutex<Vec<Weak<CancelInner>>>,
}

impl CancelInner {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

impl CancelToken {
    /// Create a token in the non-cancelled state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner::new()),
        }
    }

    /// Derive a child token. The child is cancelled when this token is
    /// cancelled; cancelling the child does not affect this token.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        self.inner
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(&child.inner));
        // Close the race with a concurrent cancel() that ran before the
        // child was registered.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancel this token and every child derived from it. Wakes all
    /// waiters immediately.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check for cancellation (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep for at most `duration`, waking immediately on cancellation.
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let guard = self.inner.mutex.lock().unwrap_or_else(|e| e.into_inner());
        let (_guard, _timeout) = self
            .inner
            .condvar
            .wait_timeout(guard, duration)
            .unwrap_or_else(|e| e.into_inner());
        self.is_cancelled()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
