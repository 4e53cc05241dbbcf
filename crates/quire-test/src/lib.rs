//! # quire-test
//!
//! Integration tests for Quire.
//!
//! This crate contains:
//! - Table operation tests against the in-memory store
//! - Change feed lifecycle and failure tests
//! - Shared fixtures for both

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;
