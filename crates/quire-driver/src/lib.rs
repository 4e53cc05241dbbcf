//! # quire-driver
//!
//! The boundary between Quire's table layer and a document store.
//!
//! This crate defines what the table layer consumes from a connection and
//! ships one complete implementation of it:
//!
//! - **Driver trait**: batch writes, filtered reads, atomic single-record
//!   mutations, filtered deletes and raw change subscriptions
//! - **Filter specs**: the compiled shape every read, delete and subscription
//!   is bound to
//! - **In-memory store**: a shared `MemoryStore` with per-connection
//!   `MemoryDriver` handles, used for embedding and by the test suites
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quire_driver::{Driver, FilterSpec, MemoryDriver, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new(1024);
//!     let driver = MemoryDriver::new(store);
//!     driver.connect().await?;
//!
//!     driver.create_table("users", "id").await?;
//!     let ack = driver.insert("users", vec![record]).await?;
//!     println!("generated {:?}", ack.generated_keys);
//!
//!     let rows = driver.read("users", &FilterSpec::All).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;

/// Driver and cursor traits.
pub mod driver;

/// Compiled filters.
pub mod filter;

/// In-memory document store.
pub mod memory;

// Re-exports
pub use driver::{ChangeCursor, Driver, Mutation, WriteAck};
pub use error::{ConnectionState, DriverError, DriverResult};
pub use filter::FilterSpec;
pub use memory::{DriverStats, FaultInjector, MemoryCursor, MemoryDriver, MemoryStore};
