//! Record operations on one table.

mod keys;
mod normalize;

use std::sync::Arc;

use quire_common::types::{is_identity, ChangeEvent, Record};
use quire_common::{QuireError, QuireResult, FEED_CHANNEL_CAPACITY};
use quire_driver::{FilterSpec, Mutation};
use serde_json::{Number, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use self::keys::KeyPlan;
use crate::client::DbInner;
use crate::criteria::Criteria;
use crate::feed::{self, ChangeFeed, FeedHandle, FeedSink};

/// A handle to one table of a [`Db`](crate::Db).
///
/// Cheap to clone. Every operation goes through the owning connection.
#[derive(Clone)]
pub struct Table {
    name: String,
    db: Arc<DbInner>,
}

impl Table {
    pub(crate) fn new(name: String, db: Arc<DbInner>) -> Self {
        Self { name, db }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn identity_field(&self) -> &str {
        &self.db.config.identity_field
    }

    fn compile(&self, criteria: &Criteria) -> QuireResult<FilterSpec> {
        criteria.compile(self.identity_field())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    async fn read(&self, filter: &FilterSpec) -> QuireResult<Vec<Record>> {
        self.db.stats.write().reads += 1;
        let rows = self.db.driver.read(&self.name, filter).await?;
        debug!("Read {} records from '{}'", rows.len(), self.name);
        Ok(rows)
    }

    /// Returns the record with identity `id`.
    pub async fn get(&self, id: impl Into<Value>) -> QuireResult<Option<Record>> {
        let filter = self.compile(&Criteria::Identity(id.into()))?;
        Ok(normalize::first(self.read(&filter).await?))
    }

    /// Returns the records with the given identities.
    ///
    /// An identity listed twice yields its record twice. `None` if nothing
    /// matched.
    pub async fn get_many<I, V>(&self, ids: I) -> QuireResult<Option<Vec<Record>>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let criteria = Criteria::IdentitySet(ids.into_iter().map(Into::into).collect());
        let filter = self.compile(&criteria)?;
        Ok(normalize::rows(self.read(&filter).await?))
    }

    /// Returns every record matching `criteria`, or `None` if none does.
    pub async fn query(&self, criteria: impl Into<Criteria>) -> QuireResult<Option<Vec<Record>>> {
        let filter = self.compile(&criteria.into())?;
        Ok(normalize::rows(self.read(&filter).await?))
    }

    /// Returns the one record matching `criteria`.
    ///
    /// `None` if nothing matches; fails with `MultipleResults` if more than
    /// one record does.
    pub async fn single(&self, criteria: impl Into<Criteria>) -> QuireResult<Option<Record>> {
        let filter = self.compile(&criteria.into())?;
        normalize::single(self.read(&filter).await?)
    }

    /// Counts the records matching `criteria`.
    pub async fn count(&self, criteria: impl Into<Criteria>) -> QuireResult<u64> {
        let filter = self.compile(&criteria.into())?;
        self.db.stats.write().reads += 1;
        Ok(self.db.driver.count(&self.name, &filter).await?)
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Inserts one record and returns its identity.
    ///
    /// A record without an identity (or with a `null` one) gets one
    /// generated by the store.
    pub async fn insert(&self, record: Record) -> QuireResult<Value> {
        self.insert_many(vec![record])
            .await?
            .pop()
            .ok_or_else(|| QuireError::database("insert returned no key"))
    }

    /// Inserts a batch as one write and returns one identity per record, in
    /// input order.
    pub async fn insert_many(&self, mut records: Vec<Record>) -> QuireResult<Vec<Value>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let plan = KeyPlan::prepare(&mut records, self.identity_field());
        let total = records.len();
        {
            let mut stats = self.db.stats.write();
            stats.writes += 1;
            stats.records_inserted += total as u64;
        }

        let ack = self.db.driver.insert(&self.name, records).await?;
        debug!(
            "Inserted {} records into '{}' ({} generated keys)",
            ack.inserted,
            self.name,
            ack.generated_keys.len()
        );
        plan.reconcile(ack.generated_keys)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    async fn modify(&self, id: Value, mutation: Mutation) -> QuireResult<()> {
        if !is_identity(&id) {
            return Err(QuireError::invalid_criteria(format!(
                "identity must be a string or number, got {}",
                id
            )));
        }

        self.db.stats.write().writes += 1;
        let ack = self.db.driver.modify(&self.name, &id, mutation).await?;
        if ack.is_skipped() {
            return Err(QuireError::not_found(self.name.clone(), id));
        }
        Ok(())
    }

    /// Merges `patch` into the record with identity `id`.
    ///
    /// Nested objects merge recursively. A patch that changes nothing still
    /// succeeds.
    pub async fn update(&self, id: impl Into<Value>, patch: Record) -> QuireResult<()> {
        self.modify(id.into(), Mutation::Merge(patch)).await
    }

    /// Atomically adds `amount` to a numeric field.
    pub async fn increment(
        &self,
        id: impl Into<Value>,
        field: impl Into<String>,
        amount: impl Into<Number>,
    ) -> QuireResult<()> {
        let mutation = Mutation::Increment {
            field: field.into(),
            amount: amount.into(),
        };
        self.modify(id.into(), mutation).await
    }

    /// Atomically pushes `value` onto a list field, creating the list if the
    /// field is absent.
    pub async fn append(
        &self,
        id: impl Into<Value>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> QuireResult<()> {
        let mutation = Mutation::Append {
            field: field.into(),
            value: value.into(),
        };
        self.modify(id.into(), mutation).await
    }

    /// Removes a field from the record with identity `id`.
    pub async fn unset(&self, id: impl Into<Value>, field: impl Into<String>) -> QuireResult<()> {
        let mutation = Mutation::Unset {
            field: field.into(),
        };
        self.modify(id.into(), mutation).await
    }

    /// Deletes the records matching `criteria` and returns how many were
    /// deleted.
    ///
    /// A single identity must exist; an identity set skips unknown ids.
    pub async fn remove(&self, criteria: impl Into<Criteria>) -> QuireResult<u64> {
        let criteria = criteria.into();
        let filter = self.compile(&criteria)?;

        self.db.stats.write().writes += 1;
        let ack = self.db.driver.delete(&self.name, &filter).await?;
        debug!("Removed {} records from '{}'", ack.deleted, self.name);

        match criteria.identity() {
            Some(id) if ack.deleted == 0 => Err(QuireError::not_found(self.name.clone(), id.clone())),
            _ => Ok(ack.deleted),
        }
    }

    /// Deletes every record and returns how many there were.
    ///
    /// On an unknown table this fails with `TableNotFound` and nothing is
    /// deleted. Callers that only want the count can treat that as zero:
    ///
    /// ```rust,ignore
    /// let removed = db.table("missing").empty().await.unwrap_or_default();
    /// assert_eq!(removed, 0);
    /// ```
    pub async fn empty(&self) -> QuireResult<u64> {
        self.remove(Criteria::Wildcard).await
    }

    /// Waits until earlier writes are durable.
    pub async fn sync(&self) -> QuireResult<()> {
        Ok(self.db.driver.sync(&self.name).await?)
    }

    // =========================================================================
    // Change feeds
    // =========================================================================

    /// Opens a change feed over the records matching `criteria`.
    ///
    /// Resolves once the feed is active. Fails if the criteria are invalid or
    /// the subscription cannot be opened, for instance on an unknown table.
    /// If the connection is closed while opening, the returned feed is
    /// already closed.
    pub async fn changes(&self, criteria: impl Into<Criteria>) -> QuireResult<ChangeFeed> {
        let filter = self.compile(&criteria.into())?;

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let (opened_tx, opened_rx) = oneshot::channel();
        let handle = feed::open(&self.db, &self.name, filter, FeedSink::Channel(tx), Some(opened_tx));
        let feed = ChangeFeed::new(handle, rx);

        match opened_rx.await {
            Ok(result) => result.map(|()| feed),
            // The pump ended without reporting; the feed is closed.
            Err(_) => Ok(feed),
        }
    }

    /// Delivers changes to the records matching `criteria` to `callback`.
    ///
    /// Returns immediately with the feed still opening. An opening failure or
    /// a failed fetch reaches the callback as one `Err`, after which nothing
    /// more is delivered.
    pub fn watch<F>(&self, criteria: impl Into<Criteria>, callback: F) -> QuireResult<FeedHandle>
    where
        F: FnMut(QuireResult<ChangeEvent>) + Send + 'static,
    {
        let filter = self.compile(&criteria.into())?;
        Ok(feed::open(
            &self.db,
            &self.name,
            filter,
            FeedSink::Callback(Box::new(callback)),
            None,
        ))
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use quire_common::types::into_record;
    use quire_common::{DbConfig, ErrorCode};
    use quire_driver::{MemoryDriver, MemoryStore};
    use serde_json::json;

    fn rec(value: Value) -> Record {
        into_record(value).unwrap()
    }

    async fn table() -> Table {
        let driver = Arc::new(MemoryDriver::new(MemoryStore::new(16)));
        let db = Db::new(DbConfig::for_testing(), driver).unwrap();
        db.connect().await.unwrap();
        db.establish(["test"]).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let table = table().await;
        let id = table.insert(rec(json!({ "a": 1 }))).await.unwrap();
        assert!(id.is_string());

        let record = table.get(id.clone()).await.unwrap().unwrap();
        assert_eq!(record["id"], id);
        assert_eq!(record["a"], json!(1));
        assert!(table.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_is_free() {
        let table = table().await;
        let writes = table.db.stats.read().writes;
        assert!(table.insert_many(Vec::new()).await.unwrap().is_empty());
        assert_eq!(table.db.stats.read().writes, writes);
    }

    #[tokio::test]
    async fn test_invalid_criteria_fails_before_io() {
        let table = table().await;
        let reads = table.db.stats.read().reads;

        let err = table.get(json!(null)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCriteria);
        let err = table.update(json!([1]), Record::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCriteria);

        assert_eq!(table.db.stats.read().reads, reads);
    }

    #[tokio::test]
    async fn test_mutations_on_missing_record() {
        let table = table().await;
        let err = table.update(7, rec(json!({ "a": 1 }))).await.unwrap_err();
        assert!(matches!(err, QuireError::NotFound { .. }));
        assert!(table.increment(7, "a", 1).await.is_err());
        assert!(table.append(7, "a", 1).await.is_err());
        assert!(table.unset(7, "a").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_identity_is_strict() {
        let table = table().await;
        table.insert(rec(json!({ "id": 1 }))).await.unwrap();

        assert!(matches!(
            table.remove(2).await,
            Err(QuireError::NotFound { .. })
        ));
        assert_eq!(table.remove(vec![1, 2]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let table = table().await;
        let other = Table::new("invalid".to_string(), Arc::clone(&table.db));
        assert!(matches!(
            other.empty().await,
            Err(QuireError::TableNotFound { .. })
        ));
        assert_eq!(other.empty().await.unwrap_or_default(), 0);
        assert!(other.changes(Criteria::Wildcard).await.is_err());
    }
}
