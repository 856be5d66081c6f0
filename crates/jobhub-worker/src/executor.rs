//! Task executor: dispatches claimed jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use jobhub_core::error::AppError;
use jobhub_core::traits::{JobRepository, JobStorage};
use jobhub_core::types::{Job, JobUpdate};

/// Progress ceiling while a handler is still running; 100 is reserved for
/// completion.
const MAX_RUNNING_PROGRESS: i32 = 99;

/// Error from task execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskExecutionError {
    /// The task failed; the message is recorded on the job.
    #[error("{0}")]
    Failed(String),

    /// Infrastructure failure while running the task.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Reports progress for one job. Failures are logged, never returned.
#[derive(Clone)]
pub struct ProgressReporter {
    queue: Arc<dyn JobRepository>,
    job_id: String,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .finish()
    }
}

impl ProgressReporter {
    /// Create a reporter for `job_id`.
    pub fn new(queue: Arc<dyn JobRepository>, job_id: impl Into<String>) -> Self {
        Self {
            queue,
            job_id: job_id.into(),
        }
    }

    /// Record progress, clamped to 0..=99.
    pub async fn report(&self, percentage: i32) {
        let progress = percentage.clamp(0, MAX_RUNNING_PROGRESS);
        if let Err(e) = self
            .queue
            .update_job(&self.job_id, JobUpdate::new().progress(progress))
            .await
        {
            warn!(job_id = %self.job_id, error = %e, "Failed to update progress");
        }
    }
}

/// Everything a handler gets for one job.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The claimed job, in `processing` state.
    pub job: Job,
    /// Job-scoped storage; `input/` and `output/` already exist.
    pub storage: Arc<dyn JobStorage>,
    /// Progress sink.
    pub progress: ProgressReporter,
}

/// Trait for task handler implementations.
#[async_trait]
pub trait TaskHandler: Send + Sync + std::fmt::Debug {
    /// The task type this handler processes.
    fn task_type(&self) -> &str;

    /// Run the task and return its output.
    async fn execute(&self, ctx: TaskContext) -> Result<Value, TaskExecutionError>;
}

/// Dispatches jobs to the handler registered for their task type.
#[derive(Debug, Default)]
pub struct TaskExecutor {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let task_type = handler.task_type().to_string();
        info!(task_type = %task_type, "Registered task handler");
        self.handlers.insert(task_type, handler);
    }

    /// Run a job through its handler.
    pub async fn execute(&self, ctx: TaskContext) -> Result<Value, TaskExecutionError> {
        let handler = self.handlers.get(&ctx.job.task_type).ok_or_else(|| {
            TaskExecutionError::Failed(format!(
                "No handler registered for task type '{}'",
                ctx.job.task_type
            ))
        })?;

        info!(
            job_id = %ctx.job.job_id,
            task_type = %ctx.job.task_type,
            retry_count = ctx.job.retry_count,
            "Executing job"
        );
        handler.execute(ctx).await
    }

    /// Check if a handler is registered for a task type.
    pub fn has_handler(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
