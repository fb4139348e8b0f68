//! Job entity and lifecycle status.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique job identifier, generated at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Opaque job parameters, consumed only by the worker operation.
pub type JobParams = serde_json::Map<String, serde_json::Value>;

/// Queue priority. Lower values are served first.
pub type Priority = i32;

/// Priority used when a retry finds no recorded priority for a job.
pub const DEFAULT_PRIORITY: Priority = 5;

/// Default retry budget for new jobs.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created and waiting in the dispatch queue.
    Pending,
    /// Holding a concurrency slot; the worker operation is running.
    Processing,
    /// Failed retriably and re-entered the queue.
    Retrying,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; no further attempts.
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Retrying, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Retrying | Self::Failed)
                // A retry whose re-enqueue fails is failed straight from RETRYING.
                | (Self::Retrying, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output produced by a successful worker operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    /// Location of the produced file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Media duration reported by the operation, in seconds.
    pub duration_seconds: f64,
}

/// Lifecycle timestamps, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTimestamps {
    /// When the ledger created the job.
    pub created_at_ms: u128,
    /// When the most recent attempt started.
    pub started_at_ms: Option<u128>,
    /// When the job reached a terminal status.
    pub completed_at_ms: Option<u128>,
}

/// One unit of requested work tracked through its status lifecycle.
///
/// Jobs are only mutated through [`JobLedger`](crate::core::JobLedger)
/// transition methods; values handed out by the ledger are snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// Parameters forwarded to the worker operation.
    pub params: JobParams,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Progress percentage, 0 to 100.
    pub progress: u8,
    /// Number of retries scheduled so far.
    pub retry_count: u32,
    /// Maximum number of retries. `retry_count` never exceeds it.
    pub max_retries: u32,
    /// Priority the job was last enqueued with.
    pub priority: Option<Priority>,
    /// Most recent failure description.
    pub error_message: Option<String>,
    /// Result of a successful run.
    pub result: Option<ResultArtifact>,
    /// Lifecycle timestamps.
    pub timestamps: JobTimestamps,
    /// 1-indexed dispatch position; only set while pending and queued.
    pub queue_position: Option<usize>,
}

impl Job {
    pub(crate) fn new(params: JobParams, max_retries: u32, now_ms: u128) -> Self {
        Self {
            id: JobId::new(),
            params,
            status: JobStatus::Pending,
            progress: 0,
            retry_count: 0,
            max_retries,
            priority: None,
            error_message: None,
            result: None,
            timestamps: JobTimestamps {
                created_at_ms: now_ms,
                started_at_ms: None,
                completed_at_ms: None,
            },
            queue_position: None,
        }
    }

    /// Whether another retry fits in the budget.
    #[must_use]
    pub const fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
