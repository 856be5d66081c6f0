//! Job queue interface.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{Job, JobUpdate, NewJob};

/// Persisted job lifecycle with an atomic claim.
///
/// Not-found and lost claim races are reported as `false`/`None`, never as
/// errors. A duplicate `job_id` on insert is a `Conflict` error.
#[async_trait]
pub trait JobRepository: Send + Sync + 'static {
    /// Persist a new job and announce it.
    async fn add_job(
        &self,
        job: NewJob,
        created_by: Option<&str>,
        priority: Option<i32>,
    ) -> AppResult<bool>;

    /// Read a job by id.
    async fn get_job(&self, job_id: &str) -> AppResult<Option<Job>>;

    /// Apply a partial update in one write. Returns `false` for an unknown
    /// job or an empty update.
    async fn update_job(&self, job_id: &str, update: JobUpdate) -> AppResult<bool>;

    /// Claim the oldest queued job whose task type is in `task_types`.
    async fn fetch_next_job(&self, task_types: &[String]) -> AppResult<Option<Job>>;

    /// Hard-delete a job. Returns `false` if it did not exist.
    async fn delete_job(&self, job_id: &str) -> AppResult<bool>;
}
