//! Retention sweep and disk usage over the job tree.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{info, warn};

use jobhub_core::error::{AppError, ErrorKind};
use jobhub_core::result::AppResult;
use jobhub_core::types::{StorageUsage, SweepReport};

/// Delete every job directory whose mtime is older than `max_age`.
///
/// A directory that fails to delete is logged and skipped.
pub async fn sweep(jobs_root: &Path, max_age: Duration) -> AppResult<SweepReport> {
    let now = SystemTime::now();
    let mut report = SweepReport::default();

    for dir in job_dirs(jobs_root).await? {
        let modified = match fs::metadata(&dir).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable job directory");
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let size = dir_size(&dir).await.unwrap_or(0);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                report.deleted_count += 1;
                report.freed_bytes += size;
            }
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to delete job directory"),
        }
    }

    info!(
        deleted = report.deleted_count,
        freed_bytes = report.freed_bytes,
        max_age_secs = max_age.as_secs(),
        "Retention sweep finished"
    );
    Ok(report)
}

/// Sum of file sizes and number of job directories.
pub async fn usage(jobs_root: &Path) -> AppResult<StorageUsage> {
    let mut usage = StorageUsage::default();
    for dir in job_dirs(jobs_root).await? {
        usage.job_count += 1;
        usage.total_bytes += dir_size(&dir).await?;
    }
    Ok(usage)
}

async fn job_dirs(jobs_root: &Path) -> AppResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = match fs::read_dir(jobs_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
        Err(e) => {
            return Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to list job directories: {}", jobs_root.display()),
                e,
            ));
        }
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
    })? {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Total size of regular files below `root`. Symlinks are not followed.
async fn dir_size(root: &Path) -> AppResult<u64> {
    let mut total = 0u64;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = fs::symlink_metadata(entry.path()).await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                total += meta.len();
            }
        }
    }
    Ok(total)
}
