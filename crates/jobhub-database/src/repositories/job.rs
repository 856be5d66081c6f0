//! Jobs table store.
//!
//! Every mutation is a single statement. The claim is a two-step
//! select-then-conditional-update: the `status = 'queued'` guard on the
//! update is what makes a claim exclusive across processes.

use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use jobhub_core::error::AppError;
use jobhub_core::result::AppResult;
use jobhub_core::types::job::DEFAULT_MAX_RETRIES;
use jobhub_core::types::{Job, JobStatus, JobUpdate, NewJob};

/// Error message recorded on jobs the reaper gives up on.
pub const ABANDONED_MESSAGE: &str = "abandoned: claim expired";

/// Raw SQL access to the `jobs` table.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Create a new job store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new row. A duplicate `job_id` is a `Conflict` error.
    pub async fn insert(
        &self,
        job: &NewJob,
        created_by: Option<&str>,
        priority: i32,
        now: i64,
    ) -> AppResult<Job> {
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (job_id, task_type, params, status, progress, priority, \
             created_at, updated_at, retry_count, max_retries, created_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?) RETURNING *",
        )
        .bind(&job.job_id)
        .bind(&job.task_type)
        .bind(Json(&job.params))
        .bind(job.status)
        .bind(job.progress)
        .bind(priority)
        .bind(now)
        .bind(now)
        .bind(DEFAULT_MAX_RETRIES)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(format!("Failed to create job '{}'", job.job_id), e))
    }

    /// Find a job by its identifier.
    pub async fn find(&self, job_id: &str) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to find job", e))
    }

    /// Apply a partial update in one statement. Returns the rows affected.
    ///
    /// `started_at` and `completed_at` are only ever filled once.
    pub async fn update(&self, job_id: &str, update: &JobUpdate, now: i64) -> AppResult<u64> {
        if update.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE jobs SET updated_at = ");
        qb.push_bind(now);

        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status);
            if status == JobStatus::Processing {
                qb.push(", started_at = COALESCE(started_at, ").push_bind(now).push(")");
            }
            if status.is_terminal() {
                qb.push(", completed_at = COALESCE(completed_at, ")
                    .push_bind(now)
                    .push(")");
            }
        }
        if let Some(progress) = update.progress {
            qb.push(", progress = ").push_bind(progress);
        }
        if let Some(output) = &update.output {
            qb.push(", output = ").push_bind(Json(output.clone()));
        }
        if let Some(message) = &update.error_message {
            qb.push(", error_message = ").push_bind(message.clone());
        }
        qb.push(" WHERE job_id = ").push_bind(job_id.to_string());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(format!("Failed to update job '{job_id}'"), e))?;

        Ok(result.rows_affected())
    }

    /// Select the oldest queued job for the given task types. Read only.
    pub async fn next_queued(&self, task_types: &[String]) -> AppResult<Option<String>> {
        if task_types.is_empty() {
            return Ok(None);
        }

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT job_id FROM jobs WHERE status = 'queued' AND task_type IN (");
        let mut separated = qb.separated(", ");
        for task_type in task_types {
            separated.push_bind(task_type.clone());
        }
        separated.push_unseparated(") ORDER BY created_at ASC, id ASC LIMIT 1");

        qb.build_query_scalar::<String>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to select next job", e))
    }

    /// Conditionally move a job from `queued` to `processing`.
    ///
    /// Returns `false` when another claimer got there first.
    pub async fn claim(&self, job_id: &str, now: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'processing', started_at = ?, updated_at = ? \
             WHERE job_id = ? AND status = 'queued'",
        )
        .bind(now)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(format!("Failed to claim job '{job_id}'"), e))?;

        let claimed = result.rows_affected() == 1;
        debug!(job_id = %job_id, claimed, "Claim attempt");
        Ok(claimed)
    }

    /// Hard-delete a job. Returns `false` if the row did not exist.
    pub async fn delete(&self, job_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(format!("Failed to delete job '{job_id}'"), e))?;
        Ok(result.rows_affected() > 0)
    }

    /// List jobs, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>, limit: i64) -> AppResult<Vec<Job>> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM jobs");
        if let Some(status) = status {
            qb.push(" WHERE status = ").push_bind(status);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(limit);

        qb.build_query_as::<Job>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to list jobs", e))
    }

    /// Number of jobs per status.
    pub async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to count jobs", e))
    }

    /// Jobs still `processing` that were claimed before `claimed_before`.
    pub async fn find_stale(&self, claimed_before: i64) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE status = 'processing' AND started_at < ? \
             ORDER BY started_at ASC, id ASC",
        )
        .bind(claimed_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to find stale jobs", e))
    }

    /// Put a stale job back in the queue, bumping `retry_count`.
    ///
    /// Guarded on the observed `started_at` so a job that was re-claimed in
    /// the meantime is left alone.
    pub async fn requeue(&self, job_id: &str, started_at: i64, now: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', started_at = NULL, progress = 0, \
             retry_count = retry_count + 1, updated_at = ? \
             WHERE job_id = ? AND status = 'processing' AND started_at = ? \
             AND retry_count < max_retries",
        )
        .bind(now)
        .bind(job_id)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(format!("Failed to requeue job '{job_id}'"), e))?;
        Ok(result.rows_affected() == 1)
    }

    /// Move a stale job to `error` after it exhausted its retries.
    pub async fn abandon(&self, job_id: &str, started_at: i64, now: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'error', error_message = ?, \
             completed_at = COALESCE(completed_at, ?), updated_at = ? \
             WHERE job_id = ? AND status = 'processing' AND started_at = ?",
        )
        .bind(ABANDONED_MESSAGE)
        .bind(now)
        .bind(now)
        .bind(job_id)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(format!("Failed to abandon job '{job_id}'"), e))?;
        Ok(result.rows_affected() == 1)
    }
}
