//! Per-connection feed bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{FeedHandle, FeedId};

/// The open feeds of one connection.
///
/// Pump tasks deregister themselves on exit; closing the connection closes
/// whatever is still registered.
#[derive(Debug, Default)]
pub(crate) struct FeedRegistry {
    feeds: Mutex<HashMap<FeedId, FeedHandle>>,
    next_id: AtomicU64,
}

impl FeedRegistry {
    /// Registers a new feed in the `Opening` state.
    pub(crate) fn register(&self, table: &str) -> FeedHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = FeedHandle::new(id, table);
        self.feeds.lock().insert(id, handle.clone());
        handle
    }

    pub(crate) fn deregister(&self, id: FeedId) {
        self.feeds.lock().remove(&id);
    }

    /// Closes every registered feed, returning how many there were.
    pub(crate) fn close_all(&self) -> usize {
        let handles: Vec<FeedHandle> = self.feeds.lock().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.close();
        }
        handles.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.feeds.lock().len()
    }
}
