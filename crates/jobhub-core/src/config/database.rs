//! Database configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Job table database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite:///var/lib/jobhub/media_store.db`.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// Pool acquire timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Build a config for the given URL with default pool settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }

    /// Reject URLs the SQLite driver cannot open.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.url.starts_with("sqlite:") {
            return Err(AppError::configuration(format!(
                "Malformed database URL (expected sqlite:...): {}",
                self.url
            )));
        }
        if self.max_connections == 0 {
            return Err(AppError::configuration(
                "database.max_connections must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10
}
