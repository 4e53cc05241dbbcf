//! System-wide constants for Quire.
//!
//! Defaults shared by the configuration layer, the drivers and the table
//! layer.

// =============================================================================
// Connection Defaults
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port (the document store's client driver port).
pub const DEFAULT_PORT: u16 = 28015;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "test";

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Record Defaults
// =============================================================================

/// Name of the identity (primary key) field when none is configured.
pub const DEFAULT_IDENTITY_FIELD: &str = "id";

/// The dynamic criteria value that selects every record in a table.
pub const WILDCARD: &str = "*";

// =============================================================================
// Change Feed Defaults
// =============================================================================

/// Default number of change events a store buffers per table for slow
/// subscribers before they are reported as lagging.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Capacity of the channel between a feed's pump and its consumer.
///
/// The pump reserves this slot before it reads the raw stream, so at most one
/// event is in flight between the stream and the caller.
pub const FEED_CHANNEL_CAPACITY: usize = 1;

/// Message carried by every error surfaced from the connection or stream
/// layer.
pub const DATABASE_ERROR_MESSAGE: &str = "Database error";
