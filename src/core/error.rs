//! Error types for engine operations.

use thiserror::Error;

use crate::core::job::{JobId, JobStatus};

/// Errors produced by engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The dispatch queue already holds its maximum number of entries.
    #[error("queue full: {max} pending jobs")]
    QueueFull {
        /// Configured maximum queue size.
        max: usize,
    },
    /// No job with the given id is tracked by the ledger.
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// The requested status change is not allowed by the job state machine.
    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        /// Job being transitioned.
        id: JobId,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },
    /// A retry was requested for a job that has used its whole retry budget.
    #[error("job {id} exhausted its retry budget of {retries}")]
    RetryBudgetExhausted {
        /// Job being retried.
        id: JobId,
        /// Configured maximum retries.
        retries: u32,
    },
    /// The job already holds a concurrency slot, so it cannot wait in the
    /// queue for another one.
    #[error("job {0} already holds a slot")]
    SlotHeld(JobId),
    /// Filesystem failure during a retention sweep or volume probe.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// True for transient backpressure the caller may retry later.
    #[must_use]
    pub const fn is_backpressure(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}

/// Failure reported by a worker operation.
///
/// The classification decides the retry protocol: retriable failures are
/// re-enqueued while the retry budget lasts, everything else fails the job.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Transient failure; the job may succeed if attempted again.
    #[error("retriable: {0}")]
    Retriable(String),
    /// Permanent failure; retrying cannot help.
    #[error("non-retriable: {0}")]
    NonRetriable(String),
    /// Anything the operation did not classify. Treated as non-retriable.
    #[error("unexpected: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl OperationError {
    /// Whether the dispatcher may schedule another attempt.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
