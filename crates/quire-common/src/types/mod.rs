//! Core data types for Quire.
//!
//! This module defines the fundamental types used throughout Quire:
//! - `Record`: a schemaless document keyed by field name
//! - Identity helpers for reading and validating primary keys
//! - `ChangeEvent`: a before/after snapshot pair emitted by change feeds

mod change;
mod record;

pub use change::{ChangeEvent, ChangeKind};
pub use record::{identity_of, into_record, is_identity, Record};
