//! Tests for the job ledger state machine and eviction

use prometheus_job_engine::core::{
    EngineError, EvictionListener, JobId, JobLedger, JobParams, JobStatus, ResultArtifact,
};
use prometheus_job_engine::util::now_ms;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn params(url: &str) -> JobParams {
    let mut p = JobParams::new();
    p.insert("url".into(), serde_json::Value::String(url.into()));
    p
}

fn artifact() -> ResultArtifact {
    ResultArtifact {
        path: "/tmp/out.mp4".into(),
        size_bytes: 42,
        duration_seconds: 1.5,
    }
}

#[test]
fn test_full_lifecycle() {
    let ledger = JobLedger::new();
    let job = ledger.create(params("https://example.com/a"), 3);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert!(job.timestamps.started_at_ms.is_none());

    let running = ledger.mark_processing(&job.id).unwrap();
    assert_eq!(running.status, JobStatus::Processing);
    assert!(running.timestamps.started_at_ms.is_some());

    assert!(ledger.update_progress(&job.id, 40).unwrap());
    let done = ledger.mark_completed(&job.id, artifact()).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.result.unwrap().size_bytes, 42);
    assert!(done.timestamps.completed_at_ms.is_some());
}

#[test]
fn test_pending_cannot_complete() {
    let ledger = JobLedger::new();
    let job = ledger.create(JobParams::new(), 3);
    let err = ledger.mark_completed(&job.id, artifact()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: JobStatus::Pending,
            to: JobStatus::Completed,
            ..
        }
    ));
}

#[test]
fn test_terminal_jobs_are_frozen() {
    let ledger = JobLedger::new();
    let job = ledger.create(JobParams::new(), 3);
    ledger.mark_processing(&job.id).unwrap();
    ledger.mark_failed(&job.id, "bad input").unwrap();

    assert!(ledger.mark_processing(&job.id).is_err());
    assert!(ledger.mark_retrying(&job.id, "again").is_err());
    assert!(!ledger.update_progress(&job.id, 10).unwrap());
    assert_eq!(
        ledger.get(&job.id).unwrap().error_message.as_deref(),
        Some("bad input")
    );
}

#[test]
fn test_retry_budget() {
    let ledger = JobLedger::new();
    let job = ledger.create(JobParams::new(), 1);
    ledger.mark_processing(&job.id).unwrap();
    let retrying = ledger.mark_retrying(&job.id, "timeout").unwrap();
    assert_eq!(retrying.retry_count, 1);
    assert_eq!(retrying.error_message.as_deref(), Some("timeout"));

    ledger.mark_processing(&job.id).unwrap();
    let err = ledger.mark_retrying(&job.id, "timeout").unwrap_err();
    assert!(matches!(err, EngineError::RetryBudgetExhausted { retries: 1, .. }));
    assert_eq!(ledger.get(&job.id).unwrap().status, JobStatus::Processing);
}

#[test]
fn test_progress_is_clamped() {
    let ledger = JobLedger::new();
    let job = ledger.create(JobParams::new(), 3);
    ledger.mark_processing(&job.id).unwrap();
    ledger.update_progress(&job.id, 250).unwrap();
    assert_eq!(ledger.get(&job.id).unwrap().progress, 100);
}

#[test]
fn test_unknown_job() {
    let ledger = JobLedger::new();
    let id = JobId::new();
    assert!(ledger.get(&id).is_none());
    assert!(matches!(
        ledger.mark_processing(&id),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn test_update_status_dispatches() {
    let ledger = JobLedger::new();
    let job = ledger.create(JobParams::new(), 3);
    ledger
        .update_status(&job.id, JobStatus::Processing, None, None)
        .unwrap();
    let failed = ledger
        .update_status(&job.id, JobStatus::Failed, Some("disk full"), None)
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(ledger
        .update_status(&job.id, JobStatus::Pending, None, None)
        .is_err());
}

#[test]
fn test_list_filters_and_limits() {
    let ledger = JobLedger::new();
    let a = ledger.create(JobParams::new(), 3);
    std::thread::sleep(Duration::from_millis(2));
    let b = ledger.create(JobParams::new(), 3);
    ledger.mark_processing(&a.id).unwrap();

    let pending = ledger.list(Some(JobStatus::Pending), 10);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);

    let all = ledger.list(None, 10);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, b.id);
    assert_eq!(ledger.list(None, 1).len(), 1);
    assert_eq!(ledger.count_by_status(JobStatus::Processing), 1);
}

#[derive(Default)]
struct CountingListener(AtomicUsize);

impl EvictionListener for CountingListener {
    fn on_job_evicted(&self, _id: &JobId) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_eviction_only_removes_old_terminal_jobs() {
    let ledger = JobLedger::new();
    let listener = Arc::new(CountingListener::default());
    ledger.subscribe_evictions(listener.clone());

    let done = ledger.create(JobParams::new(), 3);
    ledger.mark_processing(&done.id).unwrap();
    ledger.mark_completed(&done.id, artifact()).unwrap();
    let running = ledger.create(JobParams::new(), 3);
    ledger.mark_processing(&running.id).unwrap();
    let waiting = ledger.create(JobParams::new(), 3);

    let ttl = Duration::from_secs(3600);
    assert_eq!(ledger.evict_expired_at(ttl, now_ms()), 0);

    let later = now_ms() + 2 * 3600 * 1000;
    assert_eq!(ledger.evict_expired_at(ttl, later), 1);
    assert!(!ledger.contains(&done.id));
    assert!(ledger.contains(&running.id));
    assert!(ledger.contains(&waiting.id));
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_discard_only_pending() {
    let ledger = JobLedger::new();
    let job = ledger.create(JobParams::new(), 3);
    let started = ledger.create(JobParams::new(), 3);
    ledger.mark_processing(&started.id).unwrap();

    assert!(ledger.discard(&job.id));
    assert!(!ledger.discard(&started.id));
    assert_eq!(ledger.len(), 1);
}
