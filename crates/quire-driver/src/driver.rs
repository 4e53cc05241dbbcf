//! Driver and cursor traits.
//!
//! Everything the table layer needs from a connection. Every call is
//! asynchronous and fallible; implementations serialize individual requests
//! themselves, so callers share one driver across tasks without locking.

use std::fmt;

use async_trait::async_trait;
use quire_common::types::{ChangeEvent, Record};
use serde_json::{Number, Value};

use super::error::{ConnectionState, DriverResult};
use super::filter::FilterSpec;

/// Acknowledgement of a write request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteAck {
    /// Records inserted.
    pub inserted: u64,
    /// Records modified.
    pub replaced: u64,
    /// Records matched but left identical.
    pub unchanged: u64,
    /// Addressed records that did not exist.
    pub skipped: u64,
    /// Records deleted.
    pub deleted: u64,
    /// Keys generated for inserted records that carried none, in submission
    /// order.
    pub generated_keys: Vec<Value>,
}

impl WriteAck {
    /// Returns true if the addressed record was missing.
    pub fn is_skipped(&self) -> bool {
        self.skipped > 0 && self.replaced == 0 && self.unchanged == 0
    }
}

/// An atomic single-record mutation applied by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Merge the given fields into the record; nested objects merge
    /// recursively.
    Merge(Record),
    /// Add `amount` to a numeric field.
    Increment {
        /// Target field.
        field: String,
        /// Amount to add.
        amount: Number,
    },
    /// Push `value` onto a list field, creating the list if absent.
    Append {
        /// Target field.
        field: String,
        /// Value to push.
        value: Value,
    },
    /// Remove a field.
    Unset {
        /// Target field.
        field: String,
    },
}

impl Mutation {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Merge(_) => "merge",
            Mutation::Increment { .. } => "increment",
            Mutation::Append { .. } => "append",
            Mutation::Unset { .. } => "unset",
        }
    }
}

/// A raw change stream bound to one table and filter.
#[async_trait]
pub trait ChangeCursor: Send {
    /// Waits for the next matching change.
    ///
    /// The stream has no natural end: it yields events until it fails or is
    /// closed.
    async fn next(&mut self) -> DriverResult<ChangeEvent>;

    /// Releases the stream handle. Closing twice is a no-op.
    async fn close(&mut self) -> DriverResult<()>;
}

/// A connection to a document store.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Opens the connection.
    async fn connect(&self) -> DriverResult<()>;

    /// Closes the connection. Every cursor opened through it fails.
    async fn close(&self) -> DriverResult<()>;

    /// Returns the connection state.
    fn state(&self) -> ConnectionState;

    /// Lists the tables of the database.
    async fn list_tables(&self) -> DriverResult<Vec<String>>;

    /// Creates a table keyed by `primary_key`.
    async fn create_table(&self, table: &str, primary_key: &str) -> DriverResult<()>;

    /// Inserts a batch of records as one write.
    ///
    /// Records without a primary key get one generated; the keys come back in
    /// [`WriteAck::generated_keys`] in submission order.
    async fn insert(&self, table: &str, records: Vec<Record>) -> DriverResult<WriteAck>;

    /// Reads the records passing `filter`.
    async fn read(&self, table: &str, filter: &FilterSpec) -> DriverResult<Vec<Record>>;

    /// Counts the records passing `filter`.
    async fn count(&self, table: &str, filter: &FilterSpec) -> DriverResult<u64>;

    /// Applies `mutation` to the record with primary key `key`.
    ///
    /// A missing record is acknowledged as skipped, not an error.
    async fn modify(&self, table: &str, key: &Value, mutation: Mutation) -> DriverResult<WriteAck>;

    /// Deletes the records passing `filter`.
    async fn delete(&self, table: &str, filter: &FilterSpec) -> DriverResult<WriteAck>;

    /// Opens a raw change stream for the records passing `filter`.
    async fn subscribe(&self, table: &str, filter: &FilterSpec)
        -> DriverResult<Box<dyn ChangeCursor>>;

    /// Waits until earlier writes to `table` are durable.
    async fn sync(&self, table: &str) -> DriverResult<()>;
}
