//! # quire-common
//!
//! Common types, errors, and utilities for Quire.
//!
//! This crate provides the foundational types and abstractions shared by the
//! driver boundary and the table layer. It includes:
//!
//! - **Types**: Records, identities and change events
//! - **Errors**: Unified caller-facing error handling with `QuireError`
//! - **Config**: Connection configuration structures
//! - **Constants**: Defaults and limits
//!
//! ## Example
//!
//! ```rust
//! use quire_common::types::{identity_of, Record};
//! use serde_json::json;
//!
//! let record: Record = json!({ "id": 1, "a": 2 }).as_object().cloned().unwrap();
//! assert_eq!(identity_of(&record, "id"), Some(&json!(1)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::DbConfig;
pub use constants::*;
pub use error::{ErrorCode, QuireError, QuireResult};
pub use types::{ChangeEvent, ChangeKind, Record};
