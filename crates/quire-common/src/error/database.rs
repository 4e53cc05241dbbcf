//! Table operation error types.
//!
//! Every failure a table operation or change feed can report to its caller.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // Argument errors (0x0000 - 0x00FF)
    /// Criteria value could not be compiled into a filter.
    InvalidCriteria = 0x0001,
    /// Configuration rejected by validation.
    InvalidConfig = 0x0002,

    // Lookup errors (0x0100 - 0x01FF)
    /// Addressed record does not exist.
    NotFound = 0x0100,
    /// More than one record matched where exactly one was required.
    MultipleResults = 0x0101,
    /// Table is not known to the store.
    TableNotFound = 0x0102,

    // Store errors (0x0200 - 0x02FF)
    /// Opaque failure surfaced from the connection or stream layer.
    Database = 0x0200,
}

impl ErrorCode {
    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "Argument",
            0x01 => "Lookup",
            0x02 => "Store",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The caller-facing error type for Quire.
///
/// Store failures are deliberately opaque: both [`QuireError::Database`] and
/// [`QuireError::MultipleResults`] display as `Database error`, with the
/// underlying detail kept in the variant's fields.
///
/// # Example
///
/// ```rust
/// use quire_common::error::{QuireError, QuireResult};
///
/// fn lookup() -> QuireResult<()> {
///     Err(QuireError::database("socket reset"))
/// }
///
/// assert_eq!(lookup().unwrap_err().to_string(), "Database error");
/// ```
#[derive(Debug, Error)]
pub enum QuireError {
    // ==========================================================================
    // Argument Errors
    // ==========================================================================
    /// Criteria value has an unsupported shape.
    #[error("invalid criteria: {message}")]
    InvalidCriteria {
        /// What was wrong with the criteria.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Lookup Errors
    // ==========================================================================
    /// A single-record mutation addressed an identity the store does not hold.
    #[error("record {key} not found in table '{table}'")]
    NotFound {
        /// The table that was addressed.
        table: String,
        /// The missing identity.
        key: Value,
    },

    /// `single()` matched more than one record.
    #[error("Database error")]
    MultipleResults {
        /// Number of matching records.
        count: usize,
    },

    /// Table not found.
    #[error("table '{table}' not found")]
    TableNotFound {
        /// The missing table.
        table: String,
    },

    // ==========================================================================
    // Store Errors
    // ==========================================================================
    /// Failure reported by the connection or stream layer.
    #[error("Database error")]
    Database {
        /// Description of the underlying failure.
        detail: String,
    },
}

impl QuireError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCriteria { .. } => ErrorCode::InvalidCriteria,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::MultipleResults { .. } => ErrorCode::MultipleResults,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::Database { .. } => ErrorCode::Database,
        }
    }

    /// Returns true if this error was raised before any I/O took place.
    #[must_use]
    pub const fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCriteria { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Returns the underlying detail for opaque store errors.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Database { detail } => Some(detail),
            _ => None,
        }
    }

    /// Creates a database error.
    #[must_use]
    pub fn database(detail: impl Into<String>) -> Self {
        Self::Database {
            detail: detail.into(),
        }
    }

    /// Creates an invalid criteria error.
    #[must_use]
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(table: impl Into<String>, key: Value) -> Self {
        Self::NotFound {
            table: table.into(),
            key,
        }
    }
}
