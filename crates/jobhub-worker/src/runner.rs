//! Worker runner: main loop that polls for jobs and executes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::time;
use tracing::{error, info, trace, warn};

use jobhub_core::config::WorkerConfig;
use jobhub_core::result::AppResult;
use jobhub_core::traits::{JobRepository, JobStorage};
use jobhub_core::types::{Job, JobStatus, JobUpdate};

use crate::capability::CapabilityAdvertiser;
use crate::executor::{ProgressReporter, TaskContext, TaskExecutor};

/// Main worker runner that polls the queue and executes jobs.
pub struct WorkerRunner {
    queue: Arc<dyn JobRepository>,
    executor: Arc<TaskExecutor>,
    storage: Arc<dyn JobStorage>,
    advertiser: Option<CapabilityAdvertiser>,
    config: WorkerConfig,
    task_types: Vec<String>,
}

impl std::fmt::Debug for WorkerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner")
            .field("worker_id", &self.config.worker_id)
            .field("task_types", &self.task_types)
            .field("concurrency", &self.config.concurrency)
            .finish()
    }
}

impl WorkerRunner {
    /// Create a new worker runner.
    ///
    /// The worker claims the configured task types that have a registered
    /// handler, or every registered type when none are configured.
    pub fn new(
        queue: Arc<dyn JobRepository>,
        executor: Arc<TaskExecutor>,
        storage: Arc<dyn JobStorage>,
        config: WorkerConfig,
    ) -> Self {
        let task_types = if config.task_types.is_empty() {
            executor.registered_types()
        } else {
            config
                .task_types
                .iter()
                .filter(|t| {
                    let known = executor.has_handler(t);
                    if !known {
                        warn!(task_type = %t, "No handler for configured task type, not claiming it");
                    }
                    known
                })
                .cloned()
                .collect()
        };

        Self {
            queue,
            executor,
            storage,
            advertiser: None,
            config,
            task_types,
        }
    }

    /// Advertise capabilities through `advertiser` while running.
    pub fn with_advertiser(mut self, advertiser: CapabilityAdvertiser) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Task types this worker claims.
    pub fn task_types(&self) -> &[String] {
        &self.task_types
    }

    /// Claim one job and run it to completion on the current task.
    ///
    /// Returns the job id and its terminal status, or `None` when nothing
    /// was claimed.
    pub async fn run_once(&self) -> AppResult<Option<(String, JobStatus)>> {
        let Some(job) = self.queue.fetch_next_job(&self.task_types).await? else {
            return Ok(None);
        };
        let job_id = job.job_id.clone();
        let status = execute_job(
            self.queue.clone(),
            self.executor.clone(),
            self.storage.clone(),
            job,
        )
        .await;
        Ok(Some((job_id, status)))
    }

    /// Run until the cancel signal is received, then wait for in-flight
    /// jobs up to the shutdown grace period.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        info!(
            worker_id = %self.config.worker_id,
            concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            task_types = ?self.task_types,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        self.advertise(&semaphore).await;

        loop {
            if *cancel.borrow() {
                break;
            }

            let claimed = self.poll_and_execute(&semaphore).await;
            if claimed {
                continue;
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = time::sleep(poll_interval) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "Worker waiting for in-flight jobs to complete");
        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        if time::timeout(grace, semaphore.acquire_many(permits)).await.is_err() {
            warn!(worker_id = %self.config.worker_id, "Shutdown grace period elapsed with jobs still running");
        }

        if let Some(advertiser) = &self.advertiser {
            advertiser.withdraw().await;
        }
        info!(worker_id = %self.config.worker_id, "Worker shut down complete");
    }

    /// Claim a job if a slot is free and spawn it. Returns `true` when a
    /// job was claimed.
    async fn poll_and_execute(&self, semaphore: &Arc<Semaphore>) -> bool {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                trace!("All worker slots occupied, waiting...");
                return false;
            }
        };

        match self.queue.fetch_next_job(&self.task_types).await {
            Ok(Some(job)) => {
                let queue = self.queue.clone();
                let executor = self.executor.clone();
                let storage = self.storage.clone();
                let advertiser = self.advertiser.clone();
                let semaphore = semaphore.clone();
                self.advertise(&semaphore).await;

                tokio::spawn(async move {
                    execute_job(queue, executor, storage, job).await;
                    // Advertise while still holding the slot so shutdown's
                    // withdraw always comes last
                    if let Some(advertiser) = advertiser {
                        advertiser.advertise(semaphore.available_permits() + 1).await;
                    }
                    drop(permit);
                });
                true
            }
            Ok(None) => {
                trace!("No jobs available");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch next job");
                false
            }
        }
    }

    async fn advertise(&self, semaphore: &Semaphore) {
        if let Some(advertiser) = &self.advertiser {
            advertiser.advertise(semaphore.available_permits()).await;
        }
    }
}

/// Run one claimed job and record its terminal status.
async fn execute_job(
    queue: Arc<dyn JobRepository>,
    executor: Arc<TaskExecutor>,
    storage: Arc<dyn JobStorage>,
    job: Job,
) -> JobStatus {
    let job_id = job.job_id.clone();

    let outcome = match storage.create_directory(&job_id).await {
        Ok(_) => {
            let ctx = TaskContext {
                progress: ProgressReporter::new(queue.clone(), &job_id),
                storage,
                job,
            };
            executor.execute(ctx).await
        }
        Err(e) => Err(e.into()),
    };

    let (update, status) = match outcome {
        Ok(output) => {
            info!(job_id = %job_id, "Job completed successfully");
            (JobUpdate::completed(output).progress(100), JobStatus::Completed)
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Job failed");
            (JobUpdate::failed(e.to_string()), JobStatus::Error)
        }
    };

    if let Err(e) = queue.update_job(&job_id, update).await {
        error!(job_id = %job_id, error = %e, "Failed to record job result");
    }
    status
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use jobhub_core::types::{FileSource, NewJob};
    use jobhub_database::JobStore;
    use jobhub_realtime::Broadcaster;
    use jobhub_service::QueueService;
    use jobhub_storage::LocalJobStorage;

    use super::*;
    use crate::executor::{TaskExecutionError, TaskHandler};

    #[derive(Debug)]
    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        fn task_type(&self) -> &str {
            "echo"
        }

        async fn execute(&self, ctx: TaskContext) -> Result<Value, TaskExecutionError> {
            ctx.progress.report(150).await;
            let saved = ctx
                .storage
                .save(
                    &ctx.job.job_id,
                    "output/echo.json",
                    FileSource::from(ctx.job.params.to_string().into_bytes()),
                    true,
                )
                .await?;
            Ok(json!({ "files": [saved.relative_path], "hash": saved.hash }))
        }
    }

    #[derive(Debug)]
    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        fn task_type(&self) -> &str {
            "fail"
        }

        async fn execute(&self, _ctx: TaskContext) -> Result<Value, TaskExecutionError> {
            Err(TaskExecutionError::Failed("unsupported format".to_string()))
        }
    }

    async fn fixture(dir: &tempfile::TempDir) -> (Arc<QueueService>, WorkerRunner) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        jobhub_database::migration::run_migrations(&pool).await.unwrap();
        let queue = Arc::new(QueueService::new(JobStore::new(pool), Broadcaster::disabled()));
        let storage = Arc::new(LocalJobStorage::new(dir.path()).await.unwrap());

        let mut executor = TaskExecutor::new();
        executor.register(Arc::new(EchoHandler));
        executor.register(Arc::new(FailingHandler));

        let config = WorkerConfig {
            task_types: vec!["echo".to_string(), "fail".to_string(), "missing".to_string()],
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        };
        let runner = WorkerRunner::new(queue.clone(), Arc::new(executor), storage, config);
        (queue, runner)
    }

    #[tokio::test]
    async fn test_only_handled_types_are_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let (_queue, runner) = fixture(&dir).await;
        assert_eq!(runner.task_types(), ["echo".to_string(), "fail".to_string()]);
    }

    #[tokio::test]
    async fn test_run_once_completes_job() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, runner) = fixture(&dir).await;
        queue
            .add_job(NewJob::new("e1", "echo", json!({"msg": "hi"})), None, None)
            .await
            .unwrap();

        let (job_id, status) = runner.run_once().await.unwrap().unwrap();
        assert_eq!(job_id, "e1");
        assert_eq!(status, JobStatus::Completed);

        let job = queue.get_job("e1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output.unwrap()["files"][0], "output/echo.json");
        assert!(dir.path().join("jobs/e1/output/echo.json").exists());

        assert!(runner.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handler_failure_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, runner) = fixture(&dir).await;
        queue
            .add_job(NewJob::new("f1", "fail", json!({})), None, None)
            .await
            .unwrap();

        let (_, status) = runner.run_once().await.unwrap().unwrap();
        assert_eq!(status, JobStatus::Error);

        let job = queue.get_job("f1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some("unsupported format"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, runner) = fixture(&dir).await;
        for i in 0..3 {
            queue
                .add_job(NewJob::new(format!("r{i}"), "echo", json!({"i": i})), None, None)
                .await
                .unwrap();
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        for _ in 0..200 {
            let done = queue
                .list_jobs(Some(JobStatus::Completed), 10)
                .await
                .unwrap()
                .len();
            if done == 3 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        handle.await.unwrap();
        let done = queue.list_jobs(Some(JobStatus::Completed), 10).await.unwrap();
        assert_eq!(done.len(), 3);
    }
}
