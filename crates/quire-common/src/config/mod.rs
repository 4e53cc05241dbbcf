//! Configuration for Quire.
//!
//! This module provides the connection configuration shared by the table
//! layer and the drivers.

mod database;

pub use database::{DbConfig, DbConfigBuilder};
