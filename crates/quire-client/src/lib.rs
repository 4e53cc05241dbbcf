//! # quire-client
//!
//! Record-oriented tables and live change feeds over a document store
//! driver.
//!
//! This crate is the caller-facing layer of Quire. It includes:
//!
//! - **Connection context**: `Db` owns one driver connection and every feed
//!   opened through it
//! - **Tables**: get, query, single, count, batch insert with mixed
//!   caller-supplied and generated identities, atomic mutations and removal
//! - **Criteria**: identity, identity set, field equality, field presence and
//!   wildcard selection
//! - **Change feeds**: `{before, after}` snapshots as a `futures::Stream` or a
//!   callback, with idempotent close
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use quire_client::{Criteria, Db};
//! use quire_common::DbConfig;
//! use quire_driver::{MemoryDriver, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Arc::new(MemoryDriver::new(MemoryStore::new(1024)));
//!     let db = Db::new(DbConfig::default(), driver)?;
//!     db.connect().await?;
//!
//!     let users = db.establish(["users"]).await?.remove(0);
//!     let mut feed = users.changes(Criteria::Wildcard).await?;
//!
//!     let keys = users.insert_many(records).await?;
//!     let first = feed.next().await;
//!
//!     feed.close();
//!     db.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Connection context.
pub mod client;

/// Selection criteria.
pub mod criteria;

/// Change feeds.
pub mod feed;

/// Table operations.
pub mod table;

// Re-exports
pub use client::{Db, DbStats};
pub use criteria::Criteria;
pub use feed::{ChangeFeed, FeedCallback, FeedHandle, FeedId, FeedState};
pub use table::Table;
