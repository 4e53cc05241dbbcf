//! Failure injection for the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Arms one-shot failures on a [`MemoryDriver`](super::MemoryDriver).
///
/// Each call arms exactly one failure; armed failures are consumed by the
/// next matching request on any table.
#[derive(Debug, Default)]
pub struct FaultInjector {
    /// Pending read/count failures.
    reads: AtomicUsize,
    /// Pending change-feed fetch failures.
    feed_fetches: AtomicUsize,
    /// Pending connects that never complete.
    connects: AtomicUsize,
}

impl FaultInjector {
    /// Creates an injector with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `read` or `count`.
    pub fn fail_next_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    /// Fails the next change-feed fetch on any open cursor.
    pub fn fail_next_feed_fetch(&self) {
        self.feed_fetches.fetch_add(1, Ordering::SeqCst);
    }

    /// Makes the next `connect` hang until the driver is closed.
    pub fn stall_next_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn take_read(&self) -> bool {
        take(&self.reads)
    }

    pub(crate) fn take_feed_fetch(&self) -> bool {
        take(&self.feed_fetches)
    }

    pub(crate) fn take_connect(&self) -> bool {
        take(&self.connects)
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
