//! [`JobRepository`] over the SQL store and the broadcaster.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use jobhub_core::error::AppError;
use jobhub_core::result::AppResult;
use jobhub_core::traits::{EventBroadcaster, JobRepository};
use jobhub_core::types::{Job, JobEvent, JobEventKind, JobStatus, JobUpdate, NewJob, now_ms};
use jobhub_database::JobStore;
use jobhub_realtime::Broadcaster;

/// Persisted job lifecycle with an optimistic-lock claim.
#[derive(Debug, Clone)]
pub struct QueueService {
    store: JobStore,
    broadcaster: Broadcaster,
}

impl QueueService {
    /// Create a new queue service.
    pub fn new(store: JobStore, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// The underlying store.
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// The broadcaster events are emitted through.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// List jobs, newest first.
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> AppResult<Vec<Job>> {
        self.store.list(status, i64::from(limit)).await
    }

    /// Number of jobs per status.
    pub async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        self.store.count_by_status().await
    }

    pub(crate) async fn announce(&self, event: JobEvent) {
        // Delivery is best-effort; the backend logs failures
        self.broadcaster.publish_event(&event).await;
    }
}

/// Pick the event an applied update produces.
fn update_event(job_id: &str, update: &JobUpdate) -> JobEvent {
    match update.status {
        Some(JobStatus::Completed) => {
            let mut data = Map::new();
            data.insert(
                "output".to_string(),
                update.output.clone().unwrap_or(Value::Null),
            );
            if let Some(progress) = update.progress {
                data.insert("progress".to_string(), json!(progress));
            }
            JobEvent::new(JobEventKind::Completed, job_id, Value::Object(data))
        }
        Some(JobStatus::Error) => JobEvent::new(
            JobEventKind::Failed,
            job_id,
            json!({ "error": update.error_message.clone().unwrap_or_default() }),
        ),
        status => {
            let mut data = Map::new();
            if let Some(progress) = update.progress {
                data.insert("progress".to_string(), json!(progress));
            }
            if let Some(status) = status {
                data.insert("status".to_string(), json!(status));
            }
            JobEvent::new(JobEventKind::Progress, job_id, Value::Object(data))
        }
    }
}

#[async_trait]
impl JobRepository for QueueService {
    async fn add_job(
        &self,
        job: NewJob,
        created_by: Option<&str>,
        priority: Option<i32>,
    ) -> AppResult<bool> {
        if job.job_id.trim().is_empty() {
            return Err(AppError::validation("job_id must not be empty"));
        }
        if job.task_type.trim().is_empty() {
            return Err(AppError::validation("task_type must not be empty"));
        }

        let row = self
            .store
            .insert(&job, created_by, priority.unwrap_or(0), now_ms())
            .await?;

        info!(job_id = %row.job_id, task_type = %row.task_type, "Job queued");
        self.announce(JobEvent::queued(
            &row.job_id,
            &row.task_type,
            row.status,
            row.progress,
        ))
        .await;
        Ok(true)
    }

    async fn get_job(&self, job_id: &str) -> AppResult<Option<Job>> {
        self.store.find(job_id).await
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> AppResult<bool> {
        if update.is_empty() {
            debug!(job_id, "Ignoring empty job update");
            return Ok(false);
        }

        let affected = self.store.update(job_id, &update, now_ms()).await?;
        if affected == 0 {
            debug!(job_id, "Update matched no job");
            return Ok(false);
        }

        if let Some(status) = update.status {
            info!(job_id, status = %status, "Job status changed");
        }
        if update.is_observable() {
            self.announce(update_event(job_id, &update)).await;
        }
        Ok(true)
    }

    async fn fetch_next_job(&self, task_types: &[String]) -> AppResult<Option<Job>> {
        if task_types.is_empty() {
            return Ok(None);
        }

        let Some(candidate) = self.store.next_queued(task_types).await? else {
            return Ok(None);
        };

        if !self.store.claim(&candidate, now_ms()).await? {
            debug!(job_id = %candidate, "Lost claim race");
            return Ok(None);
        }

        let job = self.store.find(&candidate).await?;
        if let Some(job) = &job {
            info!(job_id = %job.job_id, task_type = %job.task_type, "Job claimed");
            self.announce(JobEvent::started(job)).await;
        }
        Ok(job)
    }

    async fn delete_job(&self, job_id: &str) -> AppResult<bool> {
        let deleted = self.store.delete(job_id).await?;
        if deleted {
            info!(job_id, "Job deleted");
            self.announce(JobEvent::deleted(job_id)).await;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jobhub_core::config::BroadcastConfig;
    use jobhub_core::error::ErrorKind;
    use jobhub_realtime::{MemoryBroadcaster, MemoryMessage};
    use tokio::sync::broadcast::Receiver;

    use super::*;

    async fn service() -> (QueueService, Receiver<MemoryMessage>) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        jobhub_database::migration::run_migrations(&pool).await.unwrap();

        let memory = Arc::new(MemoryBroadcaster::new("inference/events", 64));
        memory.connect().await;
        let rx = memory.subscribe();
        let broadcaster = Broadcaster::with_backend(BroadcastConfig::memory(), memory);

        (QueueService::new(JobStore::new(pool), broadcaster), rx)
    }

    fn next_event(rx: &mut Receiver<MemoryMessage>) -> Value {
        let msg = rx.try_recv().expect("an event was published");
        serde_json::from_slice(&msg.payload).unwrap()
    }

    #[tokio::test]
    async fn test_events_follow_the_lifecycle() {
        let (queue, mut rx) = service().await;
        let job = NewJob::new("j1", "resize", json!({"w": 100}));
        assert!(queue.add_job(job, Some("tests"), None).await.unwrap());

        let event = next_event(&mut rx);
        assert_eq!(event["event_type"], "queued");
        assert_eq!(event["status"], "queued");
        assert_eq!(event["task_type"], "resize");

        queue.fetch_next_job(&["resize".to_string()]).await.unwrap().unwrap();
        let event = next_event(&mut rx);
        assert_eq!(event["event_type"], "started");
        assert_eq!(event["status"], "processing");

        queue.update_job("j1", JobUpdate::new().progress(50)).await.unwrap();
        let event = next_event(&mut rx);
        assert_eq!(event["event_type"], "progress");
        assert_eq!(event["progress"], 50);

        queue
            .update_job("j1", JobUpdate::completed(json!({"files": ["out.jpg"]})))
            .await
            .unwrap();
        let event = next_event(&mut rx);
        assert_eq!(event["event_type"], "completed");
        assert_eq!(event["output"]["files"][0], "out.jpg");

        assert!(queue.delete_job("j1").await.unwrap());
        let event = next_event(&mut rx);
        assert_eq!(event["event_type"], "deleted");
        assert_eq!(event["job_id"], "j1");
    }

    #[tokio::test]
    async fn test_failed_event_carries_error() {
        let (queue, mut rx) = service().await;
        queue
            .add_job(NewJob::new("j2", "convert", json!({})), None, Some(3))
            .await
            .unwrap();
        let _ = next_event(&mut rx);

        queue.update_job("j2", JobUpdate::failed("bad input")).await.unwrap();
        let event = next_event(&mut rx);
        assert_eq!(event["event_type"], "failed");
        assert_eq!(event["error"], "bad input");
    }

    #[tokio::test]
    async fn test_output_only_update_is_silent() {
        let (queue, mut rx) = service().await;
        queue
            .add_job(NewJob::new("j3", "convert", json!({})), None, None)
            .await
            .unwrap();
        let _ = next_event(&mut rx);

        assert!(queue.update_job("j3", JobUpdate::new().output(json!(1))).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_inserts() {
        let (queue, _rx) = service().await;
        let job = NewJob::new("dup", "resize", json!({}));
        queue.add_job(job.clone(), None, None).await.unwrap();

        let err = queue.add_job(job, None, None).await.unwrap_err();
        assert!(err.is(ErrorKind::Conflict));

        let err = queue
            .add_job(NewJob::new("", "resize", json!({})), None, None)
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_empty_and_unknown_updates_report_false() {
        let (queue, mut rx) = service().await;
        queue
            .add_job(NewJob::new("j4", "resize", json!({})), None, None)
            .await
            .unwrap();
        let _ = next_event(&mut rx);

        assert!(!queue.update_job("j4", JobUpdate::new()).await.unwrap());
        assert!(!queue.update_job("nope", JobUpdate::new().progress(1)).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_outage_does_not_fail_writes() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        jobhub_database::migration::run_migrations(&pool).await.unwrap();
        // Never connected, so every publish reports false
        let memory = Arc::new(MemoryBroadcaster::new("inference/events", 8));
        let queue = QueueService::new(
            JobStore::new(pool),
            Broadcaster::with_backend(BroadcastConfig::memory(), memory),
        );

        assert!(
            queue
                .add_job(NewJob::new("j5", "resize", json!({})), None, None)
                .await
                .unwrap()
        );
        let job = queue.fetch_next_job(&["resize".to_string()]).await.unwrap();
        assert_eq!(job.unwrap().status, JobStatus::Processing);
    }
}
