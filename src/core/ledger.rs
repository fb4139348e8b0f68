//! In-memory job ledger: creation, status transitions and TTL eviction.
//!
//! The ledger is the single owner of [`Job`] state. Every mutation goes
//! through a transition method that checks the job state machine, so a job
//! can never skip from pending to completed or leave a terminal status.
//!
//! Jobs are stored in a sharded map: updates to one job id serialize on
//! that entry while different ids proceed concurrently.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::error::EngineError;
use crate::core::job::{Job, JobId, JobParams, JobStatus, Priority, ResultArtifact};
use crate::util::clock::now_ms;

/// Receives a notification for every job removed by TTL eviction.
pub trait EvictionListener: Send + Sync {
    /// Called once per evicted job, after it left the ledger.
    fn on_job_evicted(&self, id: &JobId);
}

/// Owner of all jobs and their lifecycle.
#[derive(Default)]
pub struct JobLedger {
    jobs: DashMap<JobId, Job>,
    listeners: RwLock<Vec<Arc<dyn EvictionListener>>>,
}

impl JobLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for eviction events.
    pub fn subscribe_evictions(&self, listener: Arc<dyn EvictionListener>) {
        self.listeners.write().push(listener);
    }

    /// Create a pending job with a fresh id.
    pub fn create(&self, params: JobParams, max_retries: u32) -> Job {
        let job = Job::new(params, max_retries, now_ms());
        debug!(job_id = %job.id, max_retries, "job created");
        self.jobs.insert(job.id, job.clone());
        job
    }

    /// Snapshot of a job.
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Whether the ledger tracks `id`.
    #[must_use]
    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    /// Number of tracked jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs filtered by status, newest first, at most `limit`.
    #[must_use]
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.timestamps.created_at_ms.cmp(&a.timestamps.created_at_ms));
        jobs.truncate(limit);
        jobs
    }

    /// Count of jobs per status.
    #[must_use]
    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|entry| entry.status == status).count()
    }

    /// Apply `f` to a job under its entry lock.
    fn with_job<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut entry = self.jobs.get_mut(id).ok_or(EngineError::NotFound(*id))?;
        f(entry.value_mut())
    }

    fn check_transition(job: &Job, to: JobStatus) -> Result<(), EngineError> {
        if job.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                id: job.id,
                from: job.status,
                to,
            })
        }
    }

    /// Remove a job that never started, without emitting an eviction event.
    ///
    /// Used when a freshly created job could not be queued. Returns false for
    /// unknown jobs and for jobs that already left PENDING.
    pub fn discard(&self, id: &JobId) -> bool {
        let removed = self
            .jobs
            .remove_if(id, |_, job| job.status == JobStatus::Pending)
            .is_some();
        if removed {
            debug!(job_id = %id, "pending job discarded");
        }
        removed
    }

    /// Remember the priority the job was enqueued with.
    pub fn record_priority(&self, id: &JobId, priority: Priority) -> Result<(), EngineError> {
        self.with_job(id, |job| {
            job.priority = Some(priority);
            Ok(())
        })
    }

    /// PENDING or RETRYING to PROCESSING. Sets the start timestamp.
    pub fn mark_processing(&self, id: &JobId) -> Result<Job, EngineError> {
        self.with_job(id, |job| {
            Self::check_transition(job, JobStatus::Processing)?;
            job.status = JobStatus::Processing;
            job.timestamps.started_at_ms = Some(now_ms());
            job.queue_position = None;
            debug!(job_id = %id, attempt = job.retry_count + 1, "job processing");
            Ok(job.clone())
        })
    }

    /// PROCESSING to COMPLETED with the produced artifact.
    pub fn mark_completed(&self, id: &JobId, artifact: ResultArtifact) -> Result<Job, EngineError> {
        self.with_job(id, |job| {
            Self::check_transition(job, JobStatus::Completed)?;
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.error_message = None;
            job.result = Some(artifact);
            job.timestamps.completed_at_ms = Some(now_ms());
            info!(job_id = %id, retries = job.retry_count, "job completed");
            Ok(job.clone())
        })
    }

    /// PROCESSING to RETRYING. Consumes one unit of retry budget.
    pub fn mark_retrying(&self, id: &JobId, error: &str) -> Result<Job, EngineError> {
        self.with_job(id, |job| {
            Self::check_transition(job, JobStatus::Retrying)?;
            if !job.has_retry_budget() {
                return Err(EngineError::RetryBudgetExhausted {
                    id: *id,
                    retries: job.max_retries,
                });
            }
            job.status = JobStatus::Retrying;
            job.retry_count += 1;
            job.error_message = Some(error.to_string());
            info!(
                job_id = %id,
                retry = job.retry_count,
                max_retries = job.max_retries,
                error,
                "job scheduled for retry"
            );
            Ok(job.clone())
        })
    }

    /// PROCESSING (or RETRYING) to FAILED with a reason.
    pub fn mark_failed(&self, id: &JobId, error: &str) -> Result<Job, EngineError> {
        self.with_job(id, |job| {
            Self::check_transition(job, JobStatus::Failed)?;
            job.status = JobStatus::Failed;
            job.error_message = Some(error.to_string());
            job.timestamps.completed_at_ms = Some(now_ms());
            info!(job_id = %id, retries = job.retry_count, error, "job failed");
            Ok(job.clone())
        })
    }

    /// Record progress for a running job, clamped to 100.
    ///
    /// Returns `false` without changing anything when the job is terminal.
    pub fn update_progress(&self, id: &JobId, progress: u8) -> Result<bool, EngineError> {
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                return Ok(false);
            }
            job.progress = progress.min(100);
            Ok(true)
        })
    }

    /// Generic transition entry point dispatching to the typed methods.
    ///
    /// `detail` is the error message for RETRYING and FAILED; COMPLETED
    /// requires `artifact`.
    pub fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        detail: Option<&str>,
        artifact: Option<ResultArtifact>,
    ) -> Result<Job, EngineError> {
        let detail = detail.unwrap_or_default();
        match (status, artifact) {
            (JobStatus::Processing, _) => self.mark_processing(id),
            (JobStatus::Completed, Some(artifact)) => self.mark_completed(id, artifact),
            (JobStatus::Retrying, _) => self.mark_retrying(id, detail),
            (JobStatus::Failed, _) => self.mark_failed(id, detail),
            (to, _) => {
                let from = self.get(id).ok_or(EngineError::NotFound(*id))?.status;
                Err(EngineError::InvalidTransition { id: *id, from, to })
            }
        }
    }

    /// Evict terminal jobs whose completion is older than `ttl`.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        self.evict_expired_at(ttl, now_ms())
    }

    /// Evict terminal jobs completed before `now_ms - ttl`.
    ///
    /// Non-terminal jobs are never evicted, however old.
    pub fn evict_expired_at(&self, ttl: Duration, now_ms: u128) -> usize {
        let cutoff = now_ms.saturating_sub(ttl.as_millis());
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.status.is_terminal()
                    && entry
                        .timestamps
                        .completed_at_ms
                        .is_some_and(|done| done < cutoff)
            })
            .map(|entry| *entry.key())
            .collect();

        let listeners = self.listeners.read().clone();
        let mut evicted = 0;
        for id in expired {
            // Re-check under the entry lock; the job may have changed since the scan.
            let removed = self.jobs.remove_if(&id, |_, job| {
                job.status.is_terminal()
                    && job.timestamps.completed_at_ms.is_some_and(|done| done < cutoff)
            });
            if removed.is_some() {
                evicted += 1;
                for listener in &listeners {
                    listener.on_job_evicted(&id);
                }
            }
        }
        if evicted > 0 {
            info!(evicted, ttl_secs = ttl.as_secs(), "evicted expired jobs");
        }
        evicted
    }
}
