//! Change feeds.
//!
//! A feed wraps one raw driver cursor in a background pump task. The pump
//! opens the cursor, pulls one event at a time and hands it to a sink: the
//! bounded channel behind a [`ChangeFeed`] stream, or a callback registered
//! with [`Table::watch`](crate::Table::watch).
//!
//! Lifecycle is `Opening -> Active -> Closed`. Closing is idempotent from any
//! state and from any task. A failed fetch delivers exactly one error and ends
//! the feed; closing the feed or its connection ends it silently.

mod pump;
mod registry;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use quire_common::types::ChangeEvent;
use quire_common::QuireResult;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use pump::FeedCallback;
pub(crate) use pump::{open, FeedSink};
pub(crate) use registry::FeedRegistry;

/// Feed identifier, unique per connection.
pub type FeedId = u64;

/// Feed lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Waiting for the raw subscription.
    Opening,
    /// Delivering events.
    Active,
    /// Stopped; nothing more will be delivered.
    Closed,
}

#[derive(Debug)]
struct FeedShared {
    id: FeedId,
    table: String,
    state: Mutex<FeedState>,
    cancel: CancellationToken,
}

/// A cloneable handle that observes and closes a feed.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    shared: Arc<FeedShared>,
}

impl FeedHandle {
    pub(crate) fn new(id: FeedId, table: &str) -> Self {
        Self {
            shared: Arc::new(FeedShared {
                id,
                table: table.to_string(),
                state: Mutex::new(FeedState::Opening),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Returns the feed id.
    pub fn id(&self) -> FeedId {
        self.shared.id
    }

    /// Returns the watched table.
    pub fn table(&self) -> &str {
        &self.shared.table
    }

    /// Returns the current state.
    pub fn state(&self) -> FeedState {
        *self.shared.state.lock()
    }

    /// Returns true once the feed has stopped.
    pub fn is_closed(&self) -> bool {
        self.state() == FeedState::Closed
    }

    /// Stops the feed.
    ///
    /// Cancels a pending subscribe, or releases the raw cursor of an active
    /// feed. Never waits for an in-flight fetch. Safe to call repeatedly.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.shared.state.lock(), FeedState::Closed);
        self.shared.cancel.cancel();
        if previous != FeedState::Closed {
            debug!(
                "Closed feed {} on table '{}' from {:?}",
                self.shared.id, self.shared.table, previous
            );
        }
    }

    /// Moves `Opening -> Active`. False if the feed was closed meanwhile.
    pub(crate) fn activate(&self) -> bool {
        let mut state = self.shared.state.lock();
        if *state == FeedState::Opening {
            *state = FeedState::Active;
            true
        } else {
            false
        }
    }

    /// Marks the feed stopped without cancelling it, so a consumer can still
    /// drain what was already delivered.
    pub(crate) fn finish(&self) {
        *self.shared.state.lock() = FeedState::Closed;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

/// A live change feed as an async stream of `{before, after}` snapshots.
///
/// Yields events in store emission order until the feed is closed, its
/// connection is closed, or a fetch fails. A failed fetch yields one
/// `Err` carrying `Database error` and then the stream ends. Dropping the
/// feed closes it.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// let mut feed = table.changes(Criteria::Wildcard).await?;
/// while let Some(event) = feed.next().await {
///     let event = event?;
///     println!("{:?} -> {:?}", event.before, event.after);
/// }
/// ```
#[derive(Debug)]
pub struct ChangeFeed {
    handle: FeedHandle,
    rx: mpsc::Receiver<QuireResult<ChangeEvent>>,
}

impl ChangeFeed {
    pub(crate) fn new(handle: FeedHandle, rx: mpsc::Receiver<QuireResult<ChangeEvent>>) -> Self {
        Self { handle, rx }
    }

    /// Returns a handle that can close this feed from another task.
    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }

    /// Returns the feed id.
    pub fn id(&self) -> FeedId {
        self.handle.id()
    }

    /// Returns the current state.
    pub fn state(&self) -> FeedState {
        self.handle.state()
    }

    /// Returns true once the feed has stopped.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Stops the feed. Safe to call repeatedly.
    pub fn close(&self) {
        self.handle.close();
    }
}

impl Stream for ChangeFeed {
    type Item = QuireResult<ChangeEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.handle.is_cancelled() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.handle.close();
    }
}
