//! The background task behind every feed.

use std::sync::Arc;

use quire_common::types::ChangeEvent;
use quire_common::{QuireError, QuireResult};
use quire_driver::{ChangeCursor, ConnectionState, FilterSpec};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::FeedHandle;
use crate::client::DbInner;

/// Callback invoked once per delivered item.
pub type FeedCallback = Box<dyn FnMut(QuireResult<ChangeEvent>) + Send>;

/// Where a feed delivers its items.
pub(crate) enum FeedSink {
    /// The bounded channel read by a `ChangeFeed`.
    Channel(mpsc::Sender<QuireResult<ChangeEvent>>),
    /// A caller-supplied callback.
    Callback(FeedCallback),
}

impl FeedSink {
    /// Waits until the consumer can take one more item. `None` if it is gone.
    ///
    /// The pump holds the returned slot while it fetches, so the raw stream is
    /// never read ahead of the consumer.
    async fn reserve(&mut self) -> Option<Slot<'_>> {
        match self {
            FeedSink::Channel(tx) => tx.reserve().await.ok().map(Slot::Channel),
            FeedSink::Callback(callback) => Some(Slot::Callback(callback)),
        }
    }
}

/// Room for exactly one item in a [`FeedSink`].
enum Slot<'a> {
    Channel(mpsc::Permit<'a, QuireResult<ChangeEvent>>),
    Callback(&'a mut FeedCallback),
}

impl Slot<'_> {
    fn fill(self, item: QuireResult<ChangeEvent>) {
        match self {
            Slot::Channel(permit) => permit.send(item),
            Slot::Callback(callback) => callback(item),
        }
    }
}

/// Registers a feed with its connection and spawns its pump.
///
/// When `opened` is given it receives the outcome of the subscribe: `Ok` once
/// the feed is active or was closed while opening, the error otherwise.
/// Without it, an opening failure is delivered to the sink.
pub(crate) fn open(
    db: &Arc<DbInner>,
    table: &str,
    filter: FilterSpec,
    sink: FeedSink,
    opened: Option<oneshot::Sender<QuireResult<()>>>,
) -> FeedHandle {
    let handle = db.feeds.register(table);
    let pump = Pump {
        db: Arc::clone(db),
        handle: handle.clone(),
        table: table.to_string(),
        filter,
        sink,
    };
    tokio::spawn(pump.run(opened));
    handle
}

struct Pump {
    db: Arc<DbInner>,
    handle: FeedHandle,
    table: String,
    filter: FilterSpec,
    sink: FeedSink,
}

impl Pump {
    async fn run(mut self, mut opened: Option<oneshot::Sender<QuireResult<()>>>) {
        let cancel = self.handle.cancel_token();
        let driver = Arc::clone(&self.db.driver);

        let subscribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = driver.subscribe(&self.table, &self.filter) => Some(result),
        };

        match subscribed {
            None => {
                debug!("Feed {} closed while opening", self.handle.id());
                report(&mut opened, Ok(()));
            }
            Some(Err(err)) => {
                warn!(
                    "Feed {} on table '{}' failed to open: {}",
                    self.handle.id(),
                    self.table,
                    err
                );
                self.handle.finish();
                let err = QuireError::from(err);
                match opened.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(err));
                    }
                    None => {
                        if let Some(slot) = self.sink.reserve().await {
                            slot.fill(Err(err));
                        }
                    }
                }
            }
            Some(Ok(mut cursor)) => {
                let active = self.handle.activate();
                report(&mut opened, Ok(()));
                if active {
                    self.db.stats.write().feeds_opened += 1;
                    debug!("Feed {} active on table '{}'", self.handle.id(), self.table);
                    self.pull(cursor.as_mut(), &cancel).await;
                }
                if let Err(err) = cursor.close().await {
                    debug!("Feed {} cursor close failed: {}", self.handle.id(), err);
                }
            }
        }

        self.handle.finish();
        self.db.feeds.deregister(self.handle.id());
    }

    async fn pull(&mut self, cursor: &mut dyn ChangeCursor, cancel: &CancellationToken) {
        let identity_field = self.db.config.identity_field.clone();
        loop {
            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                slot = self.sink.reserve() => slot,
            };
            let Some(slot) = slot else {
                debug!("Feed {} consumer went away", self.handle.id());
                return;
            };

            let event = loop {
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    fetched = cursor.next() => fetched,
                };

                match fetched {
                    Ok(event) if self.filter.matches_change(&event) => break event,
                    Ok(_) => continue,
                    Err(err) => {
                        if cancel.is_cancelled() || self.db.driver.state() == ConnectionState::Closed {
                            debug!("Feed {} stopped with its connection", self.handle.id());
                            return;
                        }
                        warn!(
                            "Feed {} on table '{}' failed: {}",
                            self.handle.id(),
                            self.table,
                            err
                        );
                        self.handle.finish();
                        self.db.stats.write().feed_errors += 1;
                        slot.fill(Err(QuireError::database(err.to_string())));
                        return;
                    }
                }
            };

            debug!(
                "Feed {} delivering {:?} of {:?}",
                self.handle.id(),
                event.kind(),
                event.identity(&identity_field)
            );
            slot.fill(Ok(event));
        }
    }
}

fn report(opened: &mut Option<oneshot::Sender<QuireResult<()>>>, result: QuireResult<()>) {
    if let Some(tx) = opened.take() {
        let _ = tx.send(result);
    }
}
