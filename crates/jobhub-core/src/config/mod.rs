//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! an optional TOML file merged with `JOBHUB__`-prefixed environment
//! variables. The merged [`AppConfig`] is built once at process start and
//! handed to each component's constructor; components never read the
//! environment themselves.

pub mod broadcast;
pub mod database;
pub mod logging;
pub mod storage;
pub mod worker;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use self::broadcast::{BroadcastConfig, BroadcastTransport};
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::storage::StorageConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job table database settings.
    pub database: DatabaseConfig,
    /// Job-scoped file storage settings.
    pub storage: StorageConfig,
    /// Event broadcast settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Worker runtime settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Environment variables use the `JOBHUB` prefix and `__` as the
    /// section separator, e.g. `JOBHUB__STORAGE__BASE_DIR`.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("JOBHUB")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("worker.task_types")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the settings that are fatal at startup.
    pub fn validate(&self) -> Result<(), AppError> {
        self.database.validate()?;
        self.storage.validate()?;
        self.broadcast.validate()?;

        let root = Path::new(&self.storage.base_dir);
        if !root.is_dir() {
            return Err(AppError::configuration(format!(
                "Storage root does not exist: {}",
                root.display()
            )));
        }

        let readonly = std::fs::metadata(root)
            .map(|m| m.permissions().readonly())
            .unwrap_or(true);
        if readonly {
            return Err(AppError::configuration(format!(
                "Storage root is not writable: {}",
                root.display()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("media");
        std::fs::create_dir_all(&base).unwrap();

        let file_path = dir.path().join("jobhub.toml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        writeln!(
            file,
            "[database]\nurl = \"sqlite://{}/jobs.db\"\n\n[storage]\nbase_dir = \"{}\"\n\n[broadcast]\ntransport = \"none\"",
            dir.path().display(),
            base.display()
        )
        .unwrap();

        let config = AppConfig::load(Some(file_path.to_str().unwrap())).unwrap();
        assert_eq!(config.broadcast.transport, BroadcastTransport::None);
        assert_eq!(config.worker.poll_interval_ms, 5_000);
        assert_eq!(config.worker.task_types, vec!["image_resize", "image_conversion"]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_missing_storage_root() {
        let config = AppConfig {
            database: DatabaseConfig::new("sqlite::memory:"),
            storage: StorageConfig::new("/definitely/not/here/jobhub"),
            broadcast: BroadcastConfig::default(),
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        };

        let err = config.validate().unwrap_err();
        assert!(err.is(crate::error::ErrorKind::Configuration));
    }
}
