//! Error handling for Quire.
//!
//! This module provides the caller-facing error type and result alias used
//! across all Quire components.

mod database;

pub use database::{ErrorCode, QuireError};

/// Result type alias for Quire operations.
pub type QuireResult<T> = std::result::Result<T, QuireError>;
