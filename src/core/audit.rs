//! Per-attempt outcome records.
//!
//! The dispatcher emits exactly one [`AttemptRecord`] per processing
//! attempt. Sinks decide what to do with it: keep a bounded history, log it,
//! or forward it to a metrics pipeline owned by the embedding service.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::JobId;
use crate::util::clock::now_ms;

/// How a processing attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The operation produced an artifact.
    Completed,
    /// Retriable failure; the job was re-enqueued.
    Retried,
    /// The job ended in FAILED.
    Failed,
    /// The job vanished or was not dispatchable when processing began.
    Skipped,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Retried => "retried",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One processing attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Job processed.
    pub job_id: JobId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Wall time spent in the attempt.
    pub duration: Duration,
    /// When the record was produced, milliseconds since the epoch.
    pub recorded_at_ms: u128,
}

impl AttemptRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(job_id: JobId, attempt: u32, outcome: AttemptOutcome, duration: Duration) -> Self {
        Self {
            job_id,
            attempt,
            outcome,
            duration,
            recorded_at_ms: now_ms(),
        }
    }
}

/// Destination for attempt records.
pub trait AuditSink: Send + Sync {
    /// Record one attempt.
    fn record(&self, record: AttemptRecord);
}

/// Bounded in-memory history, oldest dropped first.
pub struct InMemoryAuditSink {
    records: Mutex<VecDeque<AttemptRecord>>,
    max_records: usize,
}

impl InMemoryAuditSink {
    /// Create a sink keeping at most `max_records`.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_records.min(1024))),
            max_records,
        }
    }

    /// Snapshot of stored records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Records for one job.
    #[must_use]
    pub fn records_for(&self, job_id: &JobId) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.job_id == *job_id)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AttemptRecord) {
        if self.max_records == 0 {
            return;
        }
        let mut records = self.records.lock();
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);
    }
}

/// Sink that emits each record as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AttemptRecord) {
        tracing::info!(
            job_id = %record.job_id,
            attempt = record.attempt,
            outcome = %record.outcome,
            duration_ms = u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX),
            "job attempt finished"
        );
    }
}
