//! In-flight request accounting.
//!
//! # Responsibilities
//! - Count handler invocations that have entered but not yet exited
//! - Release the count on every exit path (return, error, panic, drop)
//! - Publish a single "drained" event once the count is observed at zero
//!
//! # Design Decisions
//! - One barrier per server instance, shared as a cloned `Arc` handle
//! - Counter mutations are single-word atomics; no locks on the request path
//! - The drained event holds at most one permit, so repeated signals collapse

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Fixed interval at which the drain watcher samples the counter.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Inner {
    counter: AtomicI64,
    drained: Notify,
}

/// Atomic in-flight request counter with a one-shot drained signal.
#[derive(Debug, Clone, Default)]
pub struct RequestBarrier {
    inner: Arc<Inner>,
}

impl RequestBarrier {
    /// Create an empty barrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request entering its handler.
    pub fn enter(&self) {
        self.inner.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one request leaving its handler.
    ///
    /// Must be paired with exactly one prior [`enter`](Self::enter). Prefer
    /// [`track`](Self::track), which pairs them for you.
    pub fn exit(&self) {
        let previous = self.inner.counter.fetch_sub(1, Ordering::SeqCst);
        if previous <= 0 {
            tracing::error!(
                in_flight = previous - 1,
                "Request barrier released more often than entered"
            );
        }
    }

    /// Point-in-time snapshot of the in-flight count.
    pub fn peek(&self) -> i64 {
        self.inner.counter.load(Ordering::SeqCst)
    }

    /// Fire the drained event. Never blocks; extra calls are absorbed.
    ///
    /// With no waiter the event is stored, so a waiter can see one fired
    /// long before it started waiting. Check [`peek`](Self::peek) after
    /// [`drained`](Self::drained) returns.
    pub fn signal_drained(&self) {
        self.inner.drained.notify_one();
    }

    /// Wait for the drained event.
    pub async fn drained(&self) {
        self.inner.drained.notified().await;
    }

    /// Enter now and exit when the returned guard is dropped.
    pub fn track(&self) -> RequestGuard {
        self.enter();
        RequestGuard {
            barrier: self.clone(),
        }
    }

    /// Poll the counter every `interval` until it reads zero, then fire the
    /// drained event.
    pub async fn watch_until_drained(&self, interval: Duration) {
        loop {
            let in_flight = self.peek();
            if in_flight == 0 {
                self.signal_drained();
                return;
            }
            tracing::trace!(in_flight, "Waiting for in-flight requests");
            tokio::time::sleep(interval).await;
        }
    }
}

/// Scoped hold on a [`RequestBarrier`]. Exits the barrier on drop.
#[derive(Debug)]
pub struct RequestGuard {
    barrier: RequestBarrier,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.barrier.exit();
    }
}
