//! In-memory document store.
//!
//! A [`MemoryStore`] holds the tables and outlives any single connection;
//! each [`MemoryDriver`] is one connection to it. Closing a driver fails the
//! cursors opened through it but leaves the data in place, so a later
//! connection to the same store sees everything written before.

mod cursor;
mod faults;
mod table;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use quire_common::types::Record;
use quire_common::DbConfig;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use cursor::MemoryCursor;
pub use faults::FaultInjector;

use self::table::MemoryTable;
use crate::driver::{ChangeCursor, Driver, Mutation, WriteAck};
use crate::error::{ConnectionState, DriverError, DriverResult};
use crate::filter::FilterSpec;

/// Shared table storage.
#[derive(Debug)]
pub struct MemoryStore {
    /// Tables by name.
    tables: RwLock<HashMap<String, Arc<MemoryTable>>>,
    /// Change events buffered per table.
    feed_capacity: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(feed_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            tables: RwLock::new(HashMap::new()),
            feed_capacity: feed_capacity.max(1),
        })
    }

    /// Creates an empty store sized from `config`.
    pub fn from_config(config: &DbConfig) -> Arc<Self> {
        Self::new(config.feed_capacity)
    }

    /// Returns the sorted table names.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn table(&self, name: &str) -> DriverResult<Arc<MemoryTable>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::TableNotFound(name.to_string()))
    }

    fn create_table(&self, name: &str, primary_key: &str) -> DriverResult<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(DriverError::TableExists(name.to_string()));
        }
        tables.insert(
            name.to_string(),
            Arc::new(MemoryTable::new(name, primary_key, self.feed_capacity)),
        );
        Ok(())
    }
}

/// Statistics about driver usage.
#[derive(Debug, Clone, Default)]
pub struct DriverStats {
    /// Read and count requests served.
    pub reads: u64,
    /// Insert, modify and delete requests served.
    pub writes: u64,
    /// Subscriptions opened.
    pub subscriptions: u64,
    /// Cursors not yet released.
    pub cursors_open: u64,
    /// Events handed out by cursors.
    pub events_fetched: u64,
}

/// A connection to a [`MemoryStore`].
pub struct MemoryDriver {
    /// The shared storage.
    store: Arc<MemoryStore>,
    /// Connection state.
    state: RwLock<ConnectionState>,
    /// Cancelled on close; parent of every cursor token.
    shutdown: CancellationToken,
    /// Failure injection.
    faults: Arc<FaultInjector>,
    /// Statistics.
    stats: Arc<Mutex<DriverStats>>,
}

impl MemoryDriver {
    /// Creates a disconnected driver for `store`.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            state: RwLock::new(ConnectionState::Disconnected),
            shutdown: CancellationToken::new(),
            faults: Arc::new(FaultInjector::new()),
            stats: Arc::new(Mutex::new(DriverStats::default())),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Returns the failure injector.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Returns driver statistics.
    pub fn stats(&self) -> DriverStats {
        self.stats.lock().clone()
    }

    fn ensure_connected(&self) -> DriverResult<()> {
        match *self.state.read() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Err(DriverError::NotConnected)
            }
            ConnectionState::Closed => Err(DriverError::ConnectionClosed),
        }
    }

    fn record_read(&self) -> DriverResult<()> {
        if self.faults.take_read() {
            return Err(DriverError::Injected("read failed".to_string()));
        }
        self.stats.lock().reads += 1;
        Ok(())
    }

    fn record_write(&self) {
        self.stats.lock().writes += 1;
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn connect(&self) -> DriverResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(DriverError::ConnectionClosed),
                _ => *state = ConnectionState::Connecting,
            }
        }

        if self.faults.take_connect() {
            debug!("Stalling connect to in-memory store");
            self.shutdown.cancelled().await;
            return Err(DriverError::ConnectionClosed);
        }

        tokio::task::yield_now().await;

        *self.state.write() = ConnectionState::Connected;
        info!("Connected to in-memory store");
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        *self.state.write() = ConnectionState::Closed;
        self.shutdown.cancel();
        info!("Closed in-memory store connection");
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn list_tables(&self) -> DriverResult<Vec<String>> {
        self.ensure_connected()?;
        Ok(self.store.table_names())
    }

    async fn create_table(&self, table: &str, primary_key: &str) -> DriverResult<()> {
        self.ensure_connected()?;
        self.store.create_table(table, primary_key)?;
        info!("Created table '{}' keyed by '{}'", table, primary_key);
        Ok(())
    }

    async fn insert(&self, table: &str, records: Vec<Record>) -> DriverResult<WriteAck> {
        self.ensure_connected()?;
        let table = self.store.table(table)?;
        self.record_write();
        table.insert(records)
    }

    async fn read(&self, table: &str, filter: &FilterSpec) -> DriverResult<Vec<Record>> {
        self.ensure_connected()?;
        let table = self.store.table(table)?;
        self.record_read()?;
        Ok(table.read(filter))
    }

    async fn count(&self, table: &str, filter: &FilterSpec) -> DriverResult<u64> {
        self.ensure_connected()?;
        let table = self.store.table(table)?;
        self.record_read()?;
        let count = match filter {
            FilterSpec::All => table.len(),
            _ => table.read(filter).len(),
        };
        Ok(count as u64)
    }

    async fn modify(&self, table: &str, key: &Value, mutation: Mutation) -> DriverResult<WriteAck> {
        self.ensure_connected()?;
        let table = self.store.table(table)?;
        self.record_write();
        debug!("Applying {} to {} keyed by '{}'", mutation.name(), key, table.primary_key());
        table.modify(key, &mutation)
    }

    async fn delete(&self, table: &str, filter: &FilterSpec) -> DriverResult<WriteAck> {
        self.ensure_connected()?;
        let table = self.store.table(table)?;
        self.record_write();
        Ok(table.delete(filter))
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: &FilterSpec,
    ) -> DriverResult<Box<dyn ChangeCursor>> {
        self.ensure_connected()?;
        let handle = self.store.table(table)?;
        self.stats.lock().subscriptions += 1;

        Ok(Box::new(MemoryCursor::new(
            table,
            handle.subscribe(),
            filter.clone(),
            self.shutdown.child_token(),
            Arc::clone(&self.faults),
            Arc::clone(&self.stats),
        )))
    }

    async fn sync(&self, table: &str) -> DriverResult<()> {
        self.ensure_connected()?;
        // Writes are visible as soon as they are acknowledged.
        self.store.table(table).map(|_| ())
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("state", &self.state())
            .field("tables", &self.store.table_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_common::types::into_record;
    use serde_json::json;
    use std::time::Duration;

    fn rec(value: Value) -> Record {
        into_record(value).unwrap()
    }

    async fn connected() -> MemoryDriver {
        let driver = MemoryDriver::new(MemoryStore::new(16));
        driver.connect().await.unwrap();
        driver.create_table("test", "id").await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let driver = MemoryDriver::new(MemoryStore::new(16));
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert!(matches!(
            driver.list_tables().await,
            Err(DriverError::NotConnected)
        ));

        driver.connect().await.unwrap();
        assert_eq!(driver.state(), ConnectionState::Connected);

        driver.close().await.unwrap();
        assert!(matches!(
            driver.list_tables().await,
            Err(DriverError::ConnectionClosed)
        ));
        assert!(driver.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let driver = connected().await;
        let err = driver.read("invalid", &FilterSpec::All).await.unwrap_err();
        assert!(matches!(err, DriverError::TableNotFound(_)));
        assert!(driver.subscribe("invalid", &FilterSpec::All).await.is_err());
        assert!(driver.sync("invalid").await.is_err());
        assert!(driver.sync("test").await.is_ok());
    }

    #[tokio::test]
    async fn test_store_outlives_connection() {
        let store = MemoryStore::new(16);
        let first = MemoryDriver::new(Arc::clone(&store));
        first.connect().await.unwrap();
        first.create_table("test", "id").await.unwrap();
        first.insert("test", vec![rec(json!({ "id": 1 }))]).await.unwrap();
        first.close().await.unwrap();

        let second = MemoryDriver::new(store);
        second.connect().await.unwrap();
        assert_eq!(second.count("test", &FilterSpec::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_fault() {
        let driver = connected().await;
        driver.faults().fail_next_read();
        assert!(driver.read("test", &FilterSpec::All).await.is_err());
        assert!(driver.read("test", &FilterSpec::All).await.is_ok());
        assert_eq!(driver.stats().reads, 1);
    }

    #[tokio::test]
    async fn test_cursor_receives_filtered_changes() {
        let driver = connected().await;
        let filter = FilterSpec::Membership {
            field: "id".to_string(),
            values: vec![json!(2)],
        };
        let mut cursor = driver.subscribe("test", &filter).await.unwrap();

        driver
            .insert("test", vec![rec(json!({ "id": 1 })), rec(json!({ "id": 2 }))])
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), cursor.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.after.unwrap()["id"], json!(2));
        assert_eq!(driver.stats().events_fetched, 1);
    }

    #[tokio::test]
    async fn test_cursor_fails_when_driver_closes() {
        let driver = connected().await;
        let mut cursor = driver.subscribe("test", &FilterSpec::All).await.unwrap();
        assert_eq!(driver.stats().cursors_open, 1);

        driver.close().await.unwrap();
        let err = cursor.next().await.unwrap_err();
        assert!(matches!(err, DriverError::ConnectionClosed));

        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert_eq!(driver.stats().cursors_open, 0);
    }

    #[tokio::test]
    async fn test_cursor_fault_applies_to_parked_fetch() {
        let driver = Arc::new(connected().await);
        let mut cursor = driver.subscribe("test", &FilterSpec::All).await.unwrap();

        let pending = tokio::spawn(async move { cursor.next().await });
        tokio::task::yield_now().await;

        driver.faults().fail_next_feed_fetch();
        driver.insert("test", vec![rec(json!({ "id": 1 }))]).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(DriverError::Injected(_))));
    }
}
