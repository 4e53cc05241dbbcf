//! Connection configuration structures.
//!
//! Loads and saves connection configuration from TOML files.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATABASE, DEFAULT_FEED_CAPACITY, DEFAULT_HOST,
    DEFAULT_IDENTITY_FIELD, DEFAULT_PORT,
};
use crate::error::{QuireError, QuireResult};

/// Connection configuration.
///
/// # Example
///
/// ```rust
/// use quire_common::config::DbConfig;
///
/// let config = DbConfig::default();
/// assert_eq!(config.identity_field, "id");
/// assert_eq!(config.address(), "localhost:28015");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Server hostname.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Name of the identity (primary key) field of every table.
    #[serde(default = "default_identity_field")]
    pub identity_field: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Change events buffered per table before a slow subscriber lags.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_identity_field() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_feed_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            identity_field: default_identity_field(),
            connect_timeout_secs: default_connect_timeout(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl DbConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for the named database with all other
    /// settings at their defaults.
    #[must_use]
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Creates a minimal configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database: "quiretest".to_string(),
            connect_timeout_secs: 1,
            feed_capacity: 64,
            ..Default::default()
        }
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> QuireResult<()> {
        if self.identity_field.is_empty() {
            return Err(QuireError::InvalidConfig {
                message: "identity_field must not be empty".to_string(),
            });
        }
        if self.database.is_empty() {
            return Err(QuireError::InvalidConfig {
                message: "database must not be empty".to_string(),
            });
        }
        if self.feed_capacity == 0 {
            return Err(QuireError::InvalidConfig {
                message: "feed_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the `host:port` address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns a builder for configuration.
    pub fn builder() -> DbConfigBuilder {
        DbConfigBuilder::new()
    }
}

/// Builder for connection configuration.
#[derive(Default)]
pub struct DbConfigBuilder {
    config: DbConfig,
}

impl DbConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Sets the identity field name.
    pub fn identity_field(mut self, field: impl Into<String>) -> Self {
        self.config.identity_field = field.into();
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the per-table change buffer capacity.
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.config.feed_capacity = capacity;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DbConfig {
        self.config
    }
}
