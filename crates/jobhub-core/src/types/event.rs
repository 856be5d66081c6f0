//! Lifecycle events fanned out by the broadcaster.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::job::{Job, JobStatus, now_ms};

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobEventKind {
    /// A job was enqueued.
    Queued,
    /// A worker claimed a job.
    Started,
    /// Progress or a non-terminal status changed.
    Progress,
    /// A job finished successfully.
    Completed,
    /// A job finished with an error.
    Failed,
    /// A job row was deleted.
    Deleted,
}

impl JobEventKind {
    /// Return the event type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broadcast message: `{job_id, event_type, timestamp, ...data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Job the event refers to.
    pub job_id: String,
    /// Event kind.
    pub event_type: JobEventKind,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Event-specific fields, flattened into the top-level object.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl JobEvent {
    /// Build an event stamped with the current time.
    ///
    /// Non-object `data` is stored under a `data` key. Reserved keys in
    /// `data` are dropped so they cannot shadow the envelope.
    pub fn new(event_type: JobEventKind, job_id: impl Into<String>, data: Value) -> Self {
        let mut map = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        for reserved in ["job_id", "event_type", "timestamp"] {
            map.remove(reserved);
        }

        Self {
            job_id: job_id.into(),
            event_type,
            timestamp: now_ms(),
            data: map,
        }
    }

    /// Emitted after `add_job`.
    pub fn queued(job_id: &str, task_type: &str, status: JobStatus, progress: i32) -> Self {
        Self::new(
            JobEventKind::Queued,
            job_id,
            json!({ "status": status, "progress": progress, "task_type": task_type }),
        )
    }

    /// Emitted after a successful claim.
    pub fn started(job: &Job) -> Self {
        Self::new(
            JobEventKind::Started,
            &job.job_id,
            json!({ "status": JobStatus::Processing, "task_type": job.task_type }),
        )
    }

    /// Emitted after a successful delete.
    pub fn deleted(job_id: &str) -> Self {
        Self::new(JobEventKind::Deleted, job_id, Value::Null)
    }

    /// Serialize to the JSON wire payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Look up an event-specific field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_flat() {
        let event = JobEvent::new(JobEventKind::Progress, "j1", json!({"progress": 50}));
        let value: Value = serde_json::from_slice(&event.to_payload().unwrap()).unwrap();

        assert_eq!(value["job_id"], "j1");
        assert_eq!(value["event_type"], "progress");
        assert_eq!(value["progress"], 50);
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_reserved_keys_do_not_shadow_envelope() {
        let event = JobEvent::new(
            JobEventKind::Failed,
            "j1",
            json!({"job_id": "other", "error": "boom"}),
        );
        assert_eq!(event.job_id, "j1");
        assert!(event.field("job_id").is_none());
        assert_eq!(event.field("error"), Some(&json!("boom")));
    }

    #[test]
    fn test_scalar_data_is_wrapped() {
        let event = JobEvent::new(JobEventKind::Progress, "j1", json!(7));
        assert_eq!(event.field("data"), Some(&json!(7)));
    }
}
