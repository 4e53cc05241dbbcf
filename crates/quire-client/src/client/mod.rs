//! Connection context.
//!
//! A [`Db`] owns one driver connection plus the feeds opened through it, and
//! hands out [`Table`] handles that share it.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use quire_common::{DbConfig, QuireResult};
use quire_driver::{ConnectionState, Driver, DriverError};
use tracing::{debug, info, warn};

use crate::feed::FeedRegistry;
use crate::table::Table;

/// Statistics about table and feed usage.
#[derive(Debug, Clone, Default)]
pub struct DbStats {
    /// Read requests issued (get, query, single, count).
    pub reads: u64,
    /// Write requests issued (insert, mutations, remove, empty).
    pub writes: u64,
    /// Records inserted.
    pub records_inserted: u64,
    /// Feeds that reached the active state.
    pub feeds_opened: u64,
    /// Feeds ended by a failed fetch.
    pub feed_errors: u64,
}

/// State shared by a `Db` and its tables and feeds.
pub(crate) struct DbInner {
    pub(crate) config: DbConfig,
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) feeds: FeedRegistry,
    pub(crate) declared: RwLock<BTreeSet<String>>,
    pub(crate) stats: RwLock<DbStats>,
}

/// A connection context.
///
/// Cheap to clone; clones share the connection, the feed registry and the
/// statistics.
///
/// # Example
///
/// ```rust,ignore
/// let db = Db::new(DbConfig::default(), driver)?;
/// db.connect().await?;
///
/// let users = db.table("users");
/// let id = users.insert(record).await?;
/// let found = users.get(id).await?;
///
/// db.close().await?;
/// ```
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /// Creates a context over `driver`. Does not connect.
    pub fn new(config: DbConfig, driver: Arc<dyn Driver>) -> QuireResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(DbInner {
                config,
                driver,
                feeds: FeedRegistry::default(),
                declared: RwLock::new(BTreeSet::new()),
                stats: RwLock::new(DbStats::default()),
            }),
        })
    }

    /// Opens the connection, bounded by the configured connect timeout.
    pub async fn connect(&self) -> QuireResult<()> {
        let config = &self.inner.config;
        let timeout = config.connect_timeout();

        match tokio::time::timeout(timeout, self.inner.driver.connect()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Connecting to {} timed out after {:?}", config.address(), timeout);
                return Err(DriverError::ConnectionTimeout(timeout.as_millis() as u64).into());
            }
        }

        info!("Connected to {} database '{}'", config.address(), config.database);
        Ok(())
    }

    /// Closes every open feed, then the connection.
    pub async fn close(&self) -> QuireResult<()> {
        let closed = self.inner.feeds.close_all();
        if closed > 0 {
            debug!("Closed {} open feeds", closed);
        }
        self.inner.driver.close().await?;
        info!("Closed connection to database '{}'", self.inner.config.database);
        Ok(())
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.driver.state()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    /// Returns a handle to `name`.
    ///
    /// The table is not checked; operations on an unknown table fail with
    /// `TableNotFound`.
    pub fn table(&self, name: impl Into<String>) -> Table {
        let name = name.into();
        self.inner.declared.write().insert(name.clone());
        Table::new(name, Arc::clone(&self.inner))
    }

    /// Makes sure each named table exists and is empty.
    ///
    /// Missing tables are created keyed by the configured identity field;
    /// existing ones are emptied.
    pub async fn establish<I, S>(&self, names: I) -> QuireResult<Vec<Table>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let existing: BTreeSet<String> = self.inner.driver.list_tables().await?.into_iter().collect();
        let identity_field = &self.inner.config.identity_field;

        let mut tables = Vec::new();
        for name in names {
            let table = self.table(name);
            if existing.contains(table.name()) {
                let removed = table.empty().await?;
                debug!("Emptied table '{}' ({} records)", table.name(), removed);
            } else {
                self.inner.driver.create_table(table.name(), identity_field).await?;
                info!("Established table '{}'", table.name());
            }
            tables.push(table);
        }
        Ok(tables)
    }

    /// Returns the names handed out by [`Db::table`], sorted.
    pub fn tables(&self) -> Vec<String> {
        self.inner.declared.read().iter().cloned().collect()
    }

    /// Returns the number of feeds not yet stopped.
    pub fn open_feeds(&self) -> usize {
        self.inner.feeds.len()
    }

    /// Returns usage statistics.
    pub fn stats(&self) -> DbStats {
        self.inner.stats.read().clone()
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("config", &self.inner.config)
            .field("driver", &self.inner.driver)
            .field("open_feeds", &self.inner.feeds.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Criteria;
    use quire_common::types::into_record;
    use quire_driver::{MemoryDriver, MemoryStore};
    use serde_json::json;

    fn db() -> Db {
        let driver = Arc::new(MemoryDriver::new(MemoryStore::new(16)));
        Db::new(DbConfig::for_testing(), driver).unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let db = db();
        assert_eq!(db.state(), ConnectionState::Disconnected);

        db.connect().await.unwrap();
        assert_eq!(db.state(), ConnectionState::Connected);

        db.close().await.unwrap();
        assert_eq!(db.state(), ConnectionState::Closed);
        assert!(db.connect().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out() {
        let driver = Arc::new(MemoryDriver::new(MemoryStore::new(16)));
        driver.faults().stall_next_connect();
        let db = Db::new(DbConfig::for_testing(), driver).unwrap();

        let err = db.connect().await.unwrap_err();
        assert_eq!(err.to_string(), "Database error");
        assert_eq!(err.detail(), Some("connection timeout after 1000ms"));
        assert_eq!(db.state(), ConnectionState::Connecting);

        db.connect().await.unwrap();
        assert_eq!(db.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DbConfig::builder().identity_field("").build();
        let driver = Arc::new(MemoryDriver::new(MemoryStore::new(16)));
        assert!(Db::new(config, driver).is_err());
    }

    #[tokio::test]
    async fn test_establish_creates_then_empties() {
        let db = db();
        db.connect().await.unwrap();

        let tables = db.establish(["test"]).await.unwrap();
        tables[0]
            .insert(into_record(json!({ "id": 1 })).unwrap())
            .await
            .unwrap();
        assert_eq!(tables[0].count(Criteria::Wildcard).await.unwrap(), 1);

        let tables = db.establish(["test"]).await.unwrap();
        assert_eq!(tables[0].count(Criteria::Wildcard).await.unwrap(), 0);
        assert_eq!(db.tables(), vec!["test".to_string()]);
    }
}
