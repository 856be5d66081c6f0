//! Path validation for caller-supplied job ids and relative paths.

use std::path::{Component, Path, PathBuf};

use jobhub_core::error::AppError;
use jobhub_core::result::AppResult;

/// Check that a job id is a single plain path segment.
pub fn validate_job_id(job_id: &str) -> AppResult<()> {
    let mut components = Path::new(job_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !job_id.contains(['/', '\\']) => Ok(()),
        _ => Err(AppError::validation(format!("Invalid job id: {job_id:?}"))),
    }
}

/// Normalize a relative path, rejecting absolute paths and `..`.
pub fn clean_relative(relative_path: &str) -> AppResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(AppError::validation(format!(
                    "Path escapes the job directory: {relative_path:?}"
                )));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(AppError::validation("Relative path must not be empty"));
    }
    Ok(clean)
}
