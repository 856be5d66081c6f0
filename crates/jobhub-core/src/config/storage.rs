//! Storage configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Job-scoped file storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding `jobs/` and `store/`.
    pub base_dir: String,
    /// Default age, in days, used by the retention sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl StorageConfig {
    /// Build a config rooted at `base_dir`.
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            retention_days: default_retention_days(),
        }
    }

    /// Reject an empty root.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_dir.trim().is_empty() {
            return Err(AppError::configuration("storage.base_dir must be set"));
        }
        Ok(())
    }
}

fn default_retention_days() -> u64 {
    7
}
