//! Date-partitioned content-addressed store.
//!
//! Files land at `store/YYYY/MM/DD/{sha256}.{ext}` under the base dir and
//! are addressed by that relative path. Saving identical content on the
//! same day is idempotent.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use jobhub_core::error::{AppError, ErrorKind};
use jobhub_core::result::AppResult;

use crate::hashing::sha256_hex;
use crate::paths::clean_relative;

const STORE_DIR: &str = "store";

/// Long-lived artifacts outside any job lifecycle.
#[derive(Debug, Clone)]
pub struct ContentStore {
    base_dir: PathBuf,
}

impl ContentStore {
    /// Create a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Write `data` and return its path relative to the base dir.
    pub async fn save_file(&self, data: &[u8], extension: &str) -> AppResult<String> {
        let hash = sha256_hex(data);
        let date = chrono::Utc::now().format("%Y/%m/%d").to_string();
        let ext = extension.trim_start_matches('.');
        if ext.contains(['/', '\\']) || ext.contains("..") {
            return Err(AppError::validation(format!("Invalid extension: {extension:?}")));
        }

        let file_name = if ext.is_empty() {
            hash
        } else {
            format!("{hash}.{ext}")
        };
        let relative = format!("{STORE_DIR}/{date}/{file_name}");
        let target = self.base_dir.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        fs::write(&target, data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write file: {relative}"),
                e,
            )
        })?;

        debug!(path = %relative, bytes = data.len(), "Stored content");
        Ok(relative)
    }

    /// Delete a stored file and prune the empty date directories above it.
    ///
    /// Returns `false` if the path is empty or the file did not exist.
    pub async fn delete_file(&self, relative_path: &str) -> AppResult<bool> {
        if relative_path.trim().is_empty() {
            return Ok(false);
        }
        let target = self.absolute_path(relative_path)?;
        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete file: {relative_path}"),
                    e,
                ));
            }
        }

        self.prune_empty_parents(&target).await;
        Ok(true)
    }

    /// Absolute path for a relative store path.
    pub fn absolute_path(&self, relative_path: &str) -> AppResult<PathBuf> {
        Ok(self.base_dir.join(clean_relative(relative_path)?))
    }

    async fn prune_empty_parents(&self, file: &Path) {
        let mut current = file.parent();
        while let Some(dir) = current {
            if dir == self.base_dir || !dir.starts_with(&self.base_dir) {
                break;
            }
            // remove_dir only succeeds on empty directories
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}
