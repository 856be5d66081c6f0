//! Integration tests for the job claim queue.

mod helpers;

use std::sync::Arc;

use serde_json::json;

use jobhub_core::error::ErrorKind;
use jobhub_core::traits::JobRepository;
use jobhub_core::types::{JobStatus, JobUpdate, NewJob};

fn resize() -> Vec<String> {
    vec!["resize".to_string()]
}

#[tokio::test]
async fn test_resize_job_lifecycle() {
    let app = helpers::TestApp::new().await;
    let queue = &app.queue;

    queue
        .add_job(NewJob::new("j1", "resize", json!({"w": 100, "h": 100})), None, None)
        .await
        .unwrap();

    let claimed = queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    assert_eq!(claimed.job_id, "j1");
    assert_eq!(claimed.status, JobStatus::Processing);
    assert!(claimed.started_at.is_some());

    assert!(queue.update_job("j1", JobUpdate::new().progress(50)).await.unwrap());
    assert_eq!(queue.get_job("j1").await.unwrap().unwrap().progress, 50);

    assert!(
        queue
            .update_job("j1", JobUpdate::completed(json!({"files": ["out.jpg"]})))
            .await
            .unwrap()
    );

    let job = queue.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 50);
    assert!(job.completed_at.is_some());
    assert_eq!(job.output.unwrap()["files"], json!(["out.jpg"]));
}

#[tokio::test]
async fn test_fetch_with_no_task_types_returns_none() {
    let app = helpers::TestApp::new().await;
    app.queue
        .add_job(NewJob::new("j1", "resize", json!({})), None, None)
        .await
        .unwrap();

    assert!(app.queue.fetch_next_job(&[]).await.unwrap().is_none());
    let job = app.queue.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
}

#[tokio::test]
async fn test_sequential_fetches_drain_single_job() {
    let app = helpers::TestApp::new().await;
    app.queue
        .add_job(NewJob::new("j1", "resize", json!({})), None, None)
        .await
        .unwrap();

    let first = app.queue.fetch_next_job(&resize()).await.unwrap();
    assert_eq!(first.map(|j| j.job_id).as_deref(), Some("j1"));
    assert!(app.queue.fetch_next_job(&resize()).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claimers_get_exactly_one_job() {
    let app = helpers::TestApp::new().await;
    app.queue
        .add_job(NewJob::new("only", "resize", json!({})), None, None)
        .await
        .unwrap();

    let mut claimers = Vec::new();
    for _ in 0..8 {
        claimers.push(Arc::new(app.other_queue().await));
    }

    let attempts = claimers.iter().cloned().map(|queue| {
        tokio::spawn(async move { queue.fetch_next_job(&["resize".to_string()]).await })
    });
    let results = futures::future::join_all(attempts).await;

    let winners: Vec<String> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter_map(|job| job.map(|j| j.job_id))
        .collect();
    assert_eq!(winners, vec!["only".to_string()]);

    let job = app.queue.get_job("only").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_jobs_are_each_claimed_once() {
    let app = helpers::TestApp::new().await;
    for i in 0..20 {
        app.queue
            .add_job(NewJob::new(format!("job-{i:02}"), "resize", json!({"i": i})), None, None)
            .await
            .unwrap();
    }

    let mut workers = Vec::new();
    for _ in 0..4 {
        let queue = Arc::new(app.other_queue().await);
        workers.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            let mut misses = 0;
            // A lost race returns None even with jobs left, so retry a few times
            while misses < 5 {
                match queue.fetch_next_job(&["resize".to_string()]).await.unwrap() {
                    Some(job) => claimed.push(job.job_id),
                    None => misses += 1,
                }
            }
            claimed
        }));
    }

    let mut all: Vec<String> = futures::future::join_all(workers)
        .await
        .into_iter()
        .flat_map(|joined| joined.unwrap())
        .collect();
    let claimed = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), claimed, "a job was claimed twice");
}

#[tokio::test]
async fn test_fifo_selection() {
    let app = helpers::TestApp::new().await;
    app.queue
        .add_job(NewJob::new("first", "resize", json!({})), None, None)
        .await
        .unwrap();
    app.queue
        .add_job(NewJob::new("other", "convert", json!({})), None, None)
        .await
        .unwrap();
    app.queue
        .add_job(NewJob::new("second", "resize", json!({})), None, Some(10))
        .await
        .unwrap();

    let a = app.queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    let b = app.queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    assert_eq!(a.job_id, "first");
    assert_eq!(b.job_id, "second");
}

#[tokio::test]
async fn test_timestamps_are_set_once() {
    let app = helpers::TestApp::new().await;
    let queue = &app.queue;
    queue
        .add_job(NewJob::new("t1", "resize", json!({})), None, None)
        .await
        .unwrap();

    let claimed = queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    let started_at = claimed.started_at.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(
        queue
            .update_job("t1", JobUpdate::new().status(JobStatus::Processing))
            .await
            .unwrap()
    );
    let job = queue.get_job("t1").await.unwrap().unwrap();
    assert_eq!(job.started_at, Some(started_at));
    assert!(job.completed_at.is_none());

    queue
        .update_job("t1", JobUpdate::failed("decoder crashed"))
        .await
        .unwrap();
    let completed_at = queue.get_job("t1").await.unwrap().unwrap().completed_at;
    assert!(completed_at.is_some());

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    queue
        .update_job("t1", JobUpdate::failed("decoder crashed again"))
        .await
        .unwrap();
    let job = queue.get_job("t1").await.unwrap().unwrap();
    assert_eq!(job.completed_at, completed_at);
    assert_eq!(job.error_message.as_deref(), Some("decoder crashed again"));
    assert_eq!(job.started_at, Some(started_at));
}

#[tokio::test]
async fn test_nested_json_round_trip() {
    let app = helpers::TestApp::new().await;
    let params = json!({
        "source": {"path": "in/a.png", "dims": [1920, 1080]},
        "ops": [{"resize": {"w": 100, "keep_aspect": true}}, {"format": "webp", "q": 0.85}],
        "label": "snow ❄",
        "none": null
    });
    let output = json!({"files": ["out.webp"], "meta": {"bytes": 12345, "tags": []}});

    app.queue
        .add_job(NewJob::new("rt", "resize", params.clone()), Some("tester"), None)
        .await
        .unwrap();
    app.queue
        .update_job("rt", JobUpdate::completed(output.clone()))
        .await
        .unwrap();

    let job = app.queue.get_job("rt").await.unwrap().unwrap();
    assert_eq!(job.params, params);
    assert_eq!(job.output, Some(output));
    assert_eq!(job.created_by.as_deref(), Some("tester"));
}

#[tokio::test]
async fn test_duplicate_job_id_is_conflict() {
    let app = helpers::TestApp::new().await;
    app.queue
        .add_job(NewJob::new("dup", "resize", json!({})), None, None)
        .await
        .unwrap();

    let err = app
        .queue
        .add_job(NewJob::new("dup", "convert", json!({})), None, None)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Conflict));
}

#[tokio::test]
async fn test_update_and_delete_unknown_job() {
    let app = helpers::TestApp::new().await;
    assert!(!app.queue.update_job("ghost", JobUpdate::new().progress(10)).await.unwrap());
    assert!(!app.queue.delete_job("ghost").await.unwrap());
    assert!(app.queue.get_job("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_events_follow_lifecycle_order() {
    let app = helpers::TestApp::new().await;
    let mut rx = app.subscribe();
    let queue = &app.queue;

    queue
        .add_job(NewJob::new("ev", "resize", json!({})), None, None)
        .await
        .unwrap();
    queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    queue.update_job("ev", JobUpdate::new().progress(40)).await.unwrap();
    queue
        .update_job("ev", JobUpdate::completed(json!({"files": []})))
        .await
        .unwrap();
    queue.delete_job("ev").await.unwrap();

    let events = helpers::drain_events(&mut rx);
    let kinds: Vec<&str> = events.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(kinds, ["queued", "started", "progress", "completed", "deleted"]);
    assert!(events.iter().all(|(_, e)| e["job_id"] == "ev"));
    assert_eq!(events[2].1["progress"], 40);
}

#[tokio::test]
async fn test_broadcast_outage_does_not_fail_writes() {
    let app = helpers::TestApp::new().await;
    app.events.drop_connection().await;

    assert!(
        app.queue
            .add_job(NewJob::new("quiet", "resize", json!({})), None, None)
            .await
            .unwrap()
    );
    let job = app.queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    assert_eq!(job.job_id, "quiet");
}

#[tokio::test]
async fn test_reaper_requeues_stale_claims() {
    let app = helpers::TestApp::new().await;
    app.queue
        .add_job(NewJob::new("stuck", "resize", json!({})), None, None)
        .await
        .unwrap();
    app.queue.fetch_next_job(&resize()).await.unwrap().unwrap();

    let nothing = app.queue.requeue_stale(0).await.unwrap();
    assert_eq!(nothing.total(), 0);

    let report = app
        .queue
        .requeue_stale(jobhub_core::types::now_ms() + 1_000)
        .await
        .unwrap();
    assert_eq!(report.requeued, vec!["stuck".to_string()]);

    let job = app.queue.fetch_next_job(&resize()).await.unwrap().unwrap();
    assert_eq!(job.job_id, "stuck");
    assert_eq!(job.retry_count, 1);
}
