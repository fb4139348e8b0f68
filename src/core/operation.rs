//! The pluggable worker operation the dispatcher invokes for each job.
//!
//! The engine has no knowledge of what an operation does. It hands over the
//! job parameters and interprets the result: an artifact on success, or an
//! [`OperationError`] whose classification drives the retry protocol.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{JobId, JobLedger, JobParams, OperationError, ResultArtifact};

/// Writes progress for one job back to the ledger.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    ledger: Arc<JobLedger>,
}

impl ProgressReporter {
    pub(crate) const fn new(job_id: JobId, ledger: Arc<JobLedger>) -> Self {
        Self { job_id, ledger }
    }

    /// Record progress (clamped to 100). Ignored once the job is terminal
    /// or gone.
    pub fn report(&self, percent: u8) {
        if let Err(e) = self.ledger.update_progress(&self.job_id, percent) {
            tracing::debug!(job_id = %self.job_id, error = %e, "progress update dropped");
        }
    }
}

/// Everything an operation receives for one attempt.
#[derive(Clone)]
pub struct JobContext {
    /// Job being processed.
    pub job_id: JobId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Parameters supplied at job creation.
    pub params: JobParams,
    /// Progress sink for this job.
    pub progress: ProgressReporter,
}

/// Abstraction for executing the external work behind a job.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_job_engine::core::{JobContext, OperationError, ResultArtifact, WorkerOperation};
///
/// struct Transcode;
///
/// #[async_trait]
/// impl WorkerOperation for Transcode {
///     async fn execute(&self, ctx: JobContext) -> Result<ResultArtifact, OperationError> {
///         let url = ctx.params.get("url").and_then(|v| v.as_str())
///             .ok_or_else(|| OperationError::NonRetriable("missing url".into()))?;
///         ctx.progress.report(50);
///         // ... fetch and write the file ...
///         # unimplemented!()
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerOperation: Send + Sync + 'static {
    /// Run one attempt of the job.
    ///
    /// Panics are caught by the dispatcher and treated as non-retriable.
    async fn execute(&self, ctx: JobContext) -> Result<ResultArtifact, OperationError>;
}
