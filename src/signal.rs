//! One-shot signals shared between tasks.
//!
//! A [`Signal`] can be posted any number of times from any task; only the
//! first post has an effect and later posts are dropped without blocking.
//! Waiters and pollers observe the posted state. Completion and Stop are
//! both plain `Signal`s; a new window gets a freshly armed Stop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    posted: AtomicBool,
    attempts: AtomicUsize,
    notify: Notify,
}

/// Cloneable handle to a one-shot signal.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    /// Fresh, unposted signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the signal. Returns `true` only for the post that took effect.
    pub fn post(&self) -> bool {
        self.inner.attempts.fetch_add(1, Ordering::AcqRel);
        let first = self
            .inner
            .posted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Non-blocking check.
    pub fn is_posted(&self) -> bool {
        self.inner.posted.load(Ordering::Acquire)
    }

    /// How many times `post` was called, effective or not.
    pub fn post_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Resolve once the signal has been posted.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_posted() {
                return;
            }
            notified.await;
        }
    }

    /// True when both handles refer to the same signal.
    pub fn same_as(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
