//! Error types for the driver layer.

use std::fmt;

use quire_common::QuireError;
use serde_json::Value;
use thiserror::Error;

/// Driver error type.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Connection timeout.
    #[error("connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Not connected yet.
    #[error("not connected")]
    NotConnected,

    /// Table does not exist.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// Table already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// Primary key already present.
    #[error("duplicate primary key {key} in table '{table}'")]
    DuplicateKey {
        /// The table written to.
        table: String,
        /// The conflicting key.
        key: Value,
    },

    /// Record rejected by the store.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Field has the wrong type for the requested mutation.
    #[error("field '{field}' {reason}")]
    FieldType {
        /// The offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Mutation attempted to change a primary key.
    #[error("primary key '{field}' cannot be changed")]
    ImmutableKey {
        /// The primary key field.
        field: String,
    },

    /// Subscriber fell behind and missed events.
    #[error("change feed lagged by {0} events")]
    FeedLagged(u64),

    /// Stream handle already closed.
    #[error("change feed closed")]
    FeedClosed,

    /// Failure injected for testing.
    #[error("injected failure: {0}")]
    Injected(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

impl From<DriverError> for QuireError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::TableNotFound(table) => QuireError::TableNotFound { table },
            other => QuireError::database(other.to_string()),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Connection closed.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}
