//! In-flight work tracking.
//!
//! Dispatch workers, parked queue entries, and scheduled retries all hold
//! an [`ActivityGuard`] while outstanding. `wait_idle` lets one-shot CLI
//! invocations drain before exiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    active: AtomicUsize,
    idle: Notify,
}

/// Cheaply cloneable handle to a shared activity counter.
#[derive(Clone, Default)]
pub struct ActivityTracker {
    inner: Arc<Inner>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of outstanding work.
    pub fn begin(&self) -> ActivityGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until no work is outstanding, or the deadline passes. Returns
    /// true when idle was reached.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let wait = async {
            loop {
                // Register interest before checking the counter so a guard
                // dropped in between still wakes us.
                let mut notified = std::pin::pin!(self.inner.idle.notified());
                notified.as_mut().enable();
                if self.inner.active.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(deadline, wait).await.is_ok()
    }
}

pub struct ActivityGuard {
    inner: Arc<Inner>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
