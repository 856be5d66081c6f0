//! Operator-driven recovery of jobs whose worker went away.
//!
//! Nothing here runs on its own. A claim never expires unless an operator
//! calls [`QueueService::requeue_stale`].

use serde_json::json;
use tracing::{info, warn};

use jobhub_core::result::AppResult;
use jobhub_core::types::{JobEvent, JobEventKind, JobStatus, ReapReport, now_ms};
use jobhub_database::repositories::job::ABANDONED_MESSAGE;

use super::service::QueueService;

impl QueueService {
    /// Recover jobs stuck in `processing` that were claimed before
    /// `claimed_before_ms`.
    ///
    /// Jobs with retries left go back to `queued` with `retry_count`
    /// incremented. The rest move to `error`. A job that changed state
    /// between the scan and the write is skipped.
    pub async fn requeue_stale(&self, claimed_before_ms: i64) -> AppResult<ReapReport> {
        let stale = self.store().find_stale(claimed_before_ms).await?;
        let mut report = ReapReport::default();

        for job in stale {
            let Some(started_at) = job.started_at else {
                continue;
            };
            let now = now_ms();

            if job.can_retry() {
                if self.store().requeue(&job.job_id, started_at, now).await? {
                    info!(
                        job_id = %job.job_id,
                        retry_count = job.retry_count + 1,
                        "Requeued stale job"
                    );
                    self.announce(JobEvent::new(
                        JobEventKind::Queued,
                        &job.job_id,
                        json!({
                            "status": JobStatus::Queued,
                            "progress": 0,
                            "task_type": job.task_type,
                            "retry_count": job.retry_count + 1,
                        }),
                    ))
                    .await;
                    report.requeued.push(job.job_id);
                }
            } else if self.store().abandon(&job.job_id, started_at, now).await? {
                warn!(
                    job_id = %job.job_id,
                    retry_count = job.retry_count,
                    "Abandoned stale job after exhausting retries"
                );
                self.announce(JobEvent::new(
                    JobEventKind::Failed,
                    &job.job_id,
                    json!({ "error": ABANDONED_MESSAGE }),
                ))
                .await;
                report.abandoned.push(job.job_id);
            }
        }

        Ok(report)
    }
}
