//! Job entity, status, and the write-side request types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Default number of retries granted to a new job.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a worker to claim it.
    Queued,
    /// Claimed by exactly one worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(AppError::validation(format!("Unknown job status: {other}"))),
        }
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Row id; insertion order.
    pub id: i64,
    /// Globally unique job identifier.
    pub job_id: String,
    /// Task type discriminator.
    pub task_type: String,
    /// Task parameters.
    pub params: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Progress percentage, 0-100.
    pub progress: i32,
    /// Result data, set on success.
    pub output: Option<serde_json::Value>,
    /// Error text, set on failure.
    pub error_message: Option<String>,
    /// Persisted only; not used for ordering.
    pub priority: i32,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms of the first `processing` transition.
    pub started_at: Option<i64>,
    /// Epoch ms of the first terminal transition.
    pub completed_at: Option<i64>,
    /// Epoch ms of the last applied update.
    pub updated_at: Option<i64>,
    /// Number of times the job was put back in the queue.
    pub retry_count: i32,
    /// Retry ceiling.
    pub max_retries: i32,
    /// Producer attribution.
    pub created_by: Option<String>,
}

impl Job {
    /// Check if the reaper may requeue this job.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Data required to enqueue a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Caller-supplied identifier.
    pub job_id: String,
    /// Task type discriminator.
    pub task_type: String,
    /// Task parameters.
    #[serde(default = "empty_object")]
    pub params: serde_json::Value,
    /// Initial status; `queued` unless the producer says otherwise.
    #[serde(default = "default_status")]
    pub status: JobStatus,
    /// Initial progress.
    #[serde(default)]
    pub progress: i32,
}

impl NewJob {
    /// A queued job with zero progress.
    pub fn new(
        job_id: impl Into<String>,
        task_type: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_type: task_type.into(),
            params,
            status: JobStatus::Queued,
            progress: 0,
        }
    }

    /// A queued job with a generated UUID v4 identifier.
    pub fn generated(task_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self::new(Self::generate_id(), task_type, params)
    }

    /// Generate a fresh job identifier.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_status() -> JobStatus {
    JobStatus::Queued
}

/// Partial update applied by `update_job`. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    /// New status.
    pub status: Option<JobStatus>,
    /// New progress.
    pub progress: Option<i32>,
    /// Result data.
    pub output: Option<serde_json::Value>,
    /// Error text.
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status.
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the progress.
    pub fn progress(mut self, progress: i32) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the output.
    pub fn output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Set the error message.
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Terminal success with output.
    pub fn completed(output: serde_json::Value) -> Self {
        Self::new().status(JobStatus::Completed).output(output)
    }

    /// Terminal failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new().status(JobStatus::Error).error_message(message)
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.output.is_none()
            && self.error_message.is_none()
    }

    /// True when the update should be broadcast.
    pub fn is_observable(&self) -> bool {
        self.status.is_some() || self.progress.is_some()
    }
}

/// Outcome of a stale-claim sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapReport {
    /// Jobs put back in the queue.
    pub requeued: Vec<String>,
    /// Jobs moved to `error` after exhausting retries.
    pub abandoned: Vec<String>,
}

impl ReapReport {
    /// Total number of jobs touched.
    pub fn total(&self) -> usize {
        self.requeued.len() + self.abandoned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_update_builder() {
        assert!(JobUpdate::new().is_empty());

        let update = JobUpdate::new().progress(40);
        assert!(!update.is_empty());
        assert!(update.is_observable());

        let update = JobUpdate::new().output(serde_json::json!({"a": 1}));
        assert!(!update.is_observable());

        let update = JobUpdate::failed("boom");
        assert_eq!(update.status, Some(JobStatus::Error));
        assert_eq!(update.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_new_job_deserialize_defaults() {
        let job: NewJob =
            serde_json::from_str(r#"{"job_id":"j1","task_type":"resize"}"#).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.params.as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(NewJob::generate_id(), NewJob::generate_id());
    }
}
