//! Job-scoped storage on the local filesystem.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use jobhub_core::config::StorageConfig;
use jobhub_core::error::{AppError, ErrorKind};
use jobhub_core::result::AppResult;
use jobhub_core::traits::JobStorage;
use jobhub_core::types::{FileSource, SavedFile, StorageUsage, SweepReport};

use crate::hashing::HashingWriter;
use crate::paths::{clean_relative, validate_job_id};
use crate::retention;

/// Subdirectory of the base dir holding one directory per job.
const JOBS_DIR: &str = "jobs";
const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";

/// Local filesystem job storage rooted at `{base_dir}/jobs`.
#[derive(Debug, Clone)]
pub struct LocalJobStorage {
    base_dir: PathBuf,
    jobs_root: PathBuf,
}

impl LocalJobStorage {
    /// Create a new storage rooted at `base_dir`, creating `jobs/` if
    /// missing.
    pub async fn new(base_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let base_dir = base_dir.into();
        let jobs_root = base_dir.join(JOBS_DIR);
        fs::create_dir_all(&jobs_root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", jobs_root.display()),
                e,
            )
        })?;

        info!(base_dir = %base_dir.display(), "Job storage ready");
        Ok(Self { base_dir, jobs_root })
    }

    /// Create a storage from configuration.
    pub async fn from_config(config: &StorageConfig) -> AppResult<Self> {
        Self::new(&config.base_dir).await
    }

    /// Root of the whole tree.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute path of the job's `input/` directory.
    pub fn input_dir(&self, job_id: &str) -> AppResult<PathBuf> {
        Ok(self.job_root(job_id)?.join(INPUT_DIR))
    }

    /// Absolute path of the job's `output/` directory.
    pub fn output_dir(&self, job_id: &str) -> AppResult<PathBuf> {
        Ok(self.job_root(job_id)?.join(OUTPUT_DIR))
    }

    /// Total size and count of job directories.
    pub async fn storage_usage(&self) -> AppResult<StorageUsage> {
        retention::usage(&self.jobs_root).await
    }

    /// Make an external file visible under the job's `input/` directory.
    ///
    /// On Unix this is a symlink; an existing entry with the same name is
    /// replaced. Elsewhere the file is copied.
    pub async fn link_external(
        &self,
        job_id: &str,
        external_path: &Path,
        link_name: Option<&str>,
    ) -> AppResult<PathBuf> {
        let name = match link_name {
            Some(name) => name.to_string(),
            None => external_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "External path has no file name: {}",
                        external_path.display()
                    ))
                })?,
        };
        let link = self.input_dir(job_id)?.join(clean_relative(&name)?);

        if fs::metadata(external_path).await.is_err() {
            return Err(AppError::not_found(format!(
                "External file not found: {}",
                external_path.display()
            )));
        }
        ensure_parent(&link, true).await?;

        if fs::symlink_metadata(&link).await.is_ok() {
            fs::remove_file(&link).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to replace link: {}", link.display()),
                    e,
                )
            })?;
        }

        #[cfg(unix)]
        fs::symlink(external_path, &link).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to link {}", external_path.display()),
                e,
            )
        })?;
        #[cfg(not(unix))]
        fs::copy(external_path, &link).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to copy {}", external_path.display()),
                e,
            )
        })?;

        debug!(job_id, link = %link.display(), "Linked external file");
        Ok(link)
    }

    fn job_root(&self, job_id: &str) -> AppResult<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.jobs_root.join(job_id))
    }

    fn job_path(&self, job_id: &str, relative_path: &str) -> AppResult<PathBuf> {
        Ok(self.job_root(job_id)?.join(clean_relative(relative_path)?))
    }
}

/// Create the parent directory, or fail if it is missing and creation is
/// not allowed.
async fn ensure_parent(path: &Path, create_parents: bool) -> AppResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if create_parents {
        fs::create_dir_all(parent).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create parent directory: {}", parent.display()),
                e,
            )
        })?;
    } else if !fs::metadata(parent).await.is_ok_and(|m| m.is_dir()) {
        return Err(AppError::storage(format!(
            "Parent directory does not exist: {}",
            parent.display()
        )));
    }
    Ok(())
}

async fn open_source(src: &Path) -> AppResult<fs::File> {
    fs::File::open(src).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::not_found(format!("Source file not found: {}", src.display()))
        } else {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to open source: {}", src.display()),
                e,
            )
        }
    })
}

/// Hidden sibling of `target` used while a save is in progress.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.part", uuid::Uuid::new_v4().simple()))
}

async fn write_staged(staging: &Path, source: FileSource) -> std::io::Result<(u64, String)> {
    let file = fs::File::create(staging).await?;
    let mut writer = HashingWriter::new(file);
    match source {
        FileSource::Bytes(data) => writer.write_all(&data).await?,
        FileSource::Path(src) => {
            let mut input = fs::File::open(&src).await?;
            writer.copy_from(&mut input).await?;
        }
        FileSource::Stream(mut reader) => {
            writer.copy_from(&mut reader).await?;
        }
    }
    writer.finish().await
}

fn write_error(path: &Path, e: std::io::Error) -> AppError {
    AppError::with_source(
        ErrorKind::Storage,
        format!("Failed to write file: {}", path.display()),
        e,
    )
}

#[async_trait]
impl JobStorage for LocalJobStorage {
    async fn create_directory(&self, job_id: &str) -> AppResult<PathBuf> {
        let root = self.job_root(job_id)?;
        for sub in [INPUT_DIR, OUTPUT_DIR] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create directory: {}", dir.display()),
                    e,
                )
            })?;
        }
        Ok(root)
    }

    async fn save(
        &self,
        job_id: &str,
        relative_path: &str,
        source: FileSource,
        create_parents: bool,
    ) -> AppResult<SavedFile> {
        let target = self.job_path(job_id, relative_path)?;
        ensure_parent(&target, create_parents).await?;

        let kind = source.kind();
        let source = match source {
            FileSource::Path(src) => FileSource::Stream(Box::new(open_source(&src).await?)),
            other => other,
        };

        // Stage next to the target so a failed write leaves any existing
        // file untouched
        let staging = staging_path(&target);
        let (size, hash) = match write_staged(&staging, source).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(write_error(&target, e));
            }
        };
        if let Err(e) = fs::rename(&staging, &target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(write_error(&target, e));
        }
        debug!(job_id, path = relative_path, source = kind, size, "Saved file");

        Ok(SavedFile {
            relative_path: relative_path.to_string(),
            size,
            hash,
        })
    }

    async fn allocate_path(
        &self,
        job_id: &str,
        relative_path: &str,
        create_parents: bool,
    ) -> AppResult<PathBuf> {
        let target = self.job_path(job_id, relative_path)?;
        ensure_parent(&target, create_parents).await?;
        Ok(target)
    }

    async fn open(&self, job_id: &str, relative_path: &str) -> AppResult<fs::File> {
        let target = self.job_path(job_id, relative_path)?;
        fs::File::open(&target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("File not found: {job_id}/{relative_path}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to open file: {job_id}/{relative_path}"),
                    e,
                )
            }
        })
    }

    fn resolve_path(&self, job_id: &str, relative_path: Option<&str>) -> AppResult<PathBuf> {
        match relative_path {
            Some(rel) => self.job_path(job_id, rel),
            None => self.job_root(job_id),
        }
    }

    async fn remove(&self, job_id: &str) -> AppResult<bool> {
        let root = self.job_root(job_id)?;
        match fs::remove_dir_all(&root).await {
            Ok(()) => {
                debug!(job_id, "Removed job directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to remove job directory: {}", root.display()),
                e,
            )),
        }
    }

    async fn cleanup_old_jobs(&self, max_age: Duration) -> AppResult<SweepReport> {
        retention::sweep(&self.jobs_root, max_age).await
    }
}
