//! Fixtures shared by the integration suites.

use std::sync::{Arc, Once};
use std::time::Duration;

use futures::StreamExt;
use quire_client::{ChangeFeed, Db, FeedHandle, FeedState, Table};
use quire_common::types::{into_record, Record};
use quire_common::{ChangeEvent, DbConfig, QuireResult};
use quire_driver::{DriverStats, FaultInjector, MemoryDriver, MemoryStore};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Upper bound on any wait for a feed item.
pub const FEED_WAIT: Duration = Duration::from_secs(2);

/// How long a feed must stay silent to count as quiet.
pub const QUIET_WAIT: Duration = Duration::from_millis(100);

static TRACING: Once = Once::new();

/// Installs a `RUST_LOG`-driven subscriber once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A connected context over a fresh in-memory store.
pub struct TestDb {
    /// The context under test.
    pub db: Db,
    /// The driver behind it, for faults and statistics.
    pub driver: Arc<MemoryDriver>,
}

impl TestDb {
    /// Connects with the test configuration.
    pub async fn connect() -> Self {
        Self::connect_with(DbConfig::for_testing()).await
    }

    /// Connects with `config`.
    pub async fn connect_with(config: DbConfig) -> Self {
        init_tracing();
        let driver = Arc::new(MemoryDriver::new(MemoryStore::from_config(&config)));
        let db = Db::new(config, driver.clone()).expect("valid test config");
        db.connect().await.expect("connect to in-memory store");
        Self { db, driver }
    }

    /// Connects and establishes an empty table named `test`.
    pub async fn with_table() -> (Self, Table) {
        let test_db = Self::connect().await;
        let table = test_db.establish("test").await;
        (test_db, table)
    }

    /// Establishes an empty table.
    pub async fn establish(&self, name: &str) -> Table {
        self.db
            .establish([name])
            .await
            .expect("establish table")
            .remove(0)
    }

    /// Returns the driver's failure injector.
    pub fn faults(&self) -> &FaultInjector {
        self.driver.faults()
    }

    /// Returns the driver's statistics.
    pub fn driver_stats(&self) -> DriverStats {
        self.driver.stats()
    }
}

/// Converts a JSON object literal into a record.
pub fn record(value: Value) -> Record {
    into_record(value).expect("record literal must be an object")
}

/// Converts JSON object literals into records.
pub fn records(values: Vec<Value>) -> Vec<Record> {
    values.into_iter().map(record).collect()
}

/// Three records, two of them sharing `a = 1`.
pub fn three_records() -> Vec<Record> {
    records(vec![
        json!({ "id": 1, "a": 1 }),
        json!({ "id": 2, "a": 2 }),
        json!({ "id": 3, "a": 1 }),
    ])
}

/// Waits for the next feed item.
pub async fn next_item(feed: &mut ChangeFeed) -> Option<QuireResult<ChangeEvent>> {
    tokio::time::timeout(FEED_WAIT, feed.next())
        .await
        .expect("timed out waiting for feed")
}

/// Waits for the next feed item and requires it to be an event.
pub async fn next_event(feed: &mut ChangeFeed) -> ChangeEvent {
    next_item(feed)
        .await
        .expect("feed ended")
        .expect("feed reported an error")
}

/// Returns true if the feed delivers nothing for a short while.
pub async fn is_quiet(feed: &mut ChangeFeed) -> bool {
    tokio::time::timeout(QUIET_WAIT, feed.next()).await.is_err()
}

/// Waits until the feed behind `handle` reaches `state`.
pub async fn wait_for_state(handle: &FeedHandle, state: FeedState) {
    tokio::time::timeout(FEED_WAIT, async {
        while handle.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for feed state");
}

/// A callback that forwards every item to the returned receiver.
pub fn collector() -> (
    impl FnMut(QuireResult<ChangeEvent>) + Send + 'static,
    mpsc::UnboundedReceiver<QuireResult<ChangeEvent>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |item: QuireResult<ChangeEvent>| {
        let _ = tx.send(item);
    };
    (callback, rx)
}

/// Waits for the next item forwarded by a [`collector`].
pub async fn collected(
    rx: &mut mpsc::UnboundedReceiver<QuireResult<ChangeEvent>>,
) -> QuireResult<ChangeEvent> {
    tokio::time::timeout(FEED_WAIT, rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback dropped")
}

/// Returns the identity of the event's after-image.
pub fn after_id(event: &ChangeEvent) -> Value {
    event
        .after
        .as_ref()
        .and_then(|r| r.get("id").cloned())
        .unwrap_or(Value::Null)
}
