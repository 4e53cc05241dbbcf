//! Raw change cursors over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use quire_common::types::ChangeEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::faults::FaultInjector;
use super::DriverStats;
use crate::driver::ChangeCursor;
use crate::error::{DriverError, DriverResult};
use crate::filter::FilterSpec;

/// A change stream bound to one table and filter.
///
/// Fails with [`DriverError::ConnectionClosed`] once the owning driver is
/// closed.
pub struct MemoryCursor {
    /// Table name, for logging.
    table: String,
    /// Change receiver.
    rx: broadcast::Receiver<ChangeEvent>,
    /// Filter bound at subscription time.
    filter: FilterSpec,
    /// Cancelled when this cursor or its driver closes.
    shutdown: CancellationToken,
    /// Shared failure injection.
    faults: Arc<FaultInjector>,
    /// Shared driver statistics.
    stats: Arc<Mutex<DriverStats>>,
    /// Whether the handle has been released.
    released: bool,
}

impl MemoryCursor {
    pub(crate) fn new(
        table: &str,
        rx: broadcast::Receiver<ChangeEvent>,
        filter: FilterSpec,
        shutdown: CancellationToken,
        faults: Arc<FaultInjector>,
        stats: Arc<Mutex<DriverStats>>,
    ) -> Self {
        stats.lock().cursors_open += 1;
        Self {
            table: table.to_string(),
            rx,
            filter,
            shutdown,
            faults,
            stats,
            released: false,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shutdown.cancel();

        let mut stats = self.stats.lock();
        stats.cursors_open = stats.cursors_open.saturating_sub(1);
        debug!("Released change cursor on table '{}'", self.table);
    }
}

#[async_trait]
impl ChangeCursor for MemoryCursor {
    async fn next(&mut self) -> DriverResult<ChangeEvent> {
        loop {
            if self.released {
                return Err(DriverError::FeedClosed);
            }
            if self.faults.take_feed_fetch() {
                return Err(DriverError::Injected("change fetch failed".to_string()));
            }

            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(DriverError::ConnectionClosed),
                received = self.rx.recv() => received,
            };

            let event = match received {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => return Err(DriverError::FeedLagged(missed)),
                Err(RecvError::Closed) => return Err(DriverError::FeedClosed),
            };

            // A fault armed while this fetch was parked applies to it.
            if self.faults.take_feed_fetch() {
                return Err(DriverError::Injected("change fetch failed".to_string()));
            }

            if self.filter.matches_change(&event) {
                self.stats.lock().events_fetched += 1;
                return Ok(event);
            }
        }
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MemoryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCursor")
            .field("table", &self.table)
            .field("filter", &self.filter)
            .field("released", &self.released)
            .finish()
    }
}
