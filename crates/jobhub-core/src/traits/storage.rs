//! Job-scoped file storage interface.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{FileSource, SavedFile, SweepReport};

/// An isolated directory per job with `input/` and `output/` subtrees.
///
/// Job ids and relative paths that are absolute or contain `..` are
/// rejected with a `Validation` error.
#[async_trait]
pub trait JobStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Create `input/` and `output/` for the job. Idempotent.
    async fn create_directory(&self, job_id: &str) -> AppResult<PathBuf>;

    /// Write `source` under the job root, hashing the bytes as they are
    /// written.
    async fn save(
        &self,
        job_id: &str,
        relative_path: &str,
        source: FileSource,
        create_parents: bool,
    ) -> AppResult<SavedFile>;

    /// Reserve a path for an external writer. No content is written.
    async fn allocate_path(
        &self,
        job_id: &str,
        relative_path: &str,
        create_parents: bool,
    ) -> AppResult<PathBuf>;

    /// Open an existing file for reading.
    async fn open(&self, job_id: &str, relative_path: &str) -> AppResult<tokio::fs::File>;

    /// Compute an absolute path without touching the filesystem.
    fn resolve_path(&self, job_id: &str, relative_path: Option<&str>) -> AppResult<PathBuf>;

    /// Delete the job tree. Returns `false` if it did not exist.
    async fn remove(&self, job_id: &str) -> AppResult<bool>;

    /// Delete job directories last modified more than `max_age` ago.
    async fn cleanup_old_jobs(&self, max_age: Duration) -> AppResult<SweepReport>;
}
