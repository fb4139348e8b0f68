//! Engine facade: the in-process API a boundary layer (HTTP handlers, CLI)
//! calls into.
//!
//! Every component is constructed once and shared by reference; there is no
//! global lookup. Build an engine with
//! [`JobEngineBuilder`](crate::builders::JobEngineBuilder).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::{
    ConcurrencyGate, Dispatcher, DispatcherStats, EngineError, Job, JobId, JobLedger, JobParams,
    JobStatus, Priority, RateDecision, RateLimiter, RetentionSweeper, SweepReport,
};
use crate::infra::{ActiveArtifactRegistry, DispatchQueue, PriorityDispatchQueue};

/// Point-in-time view of engine load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Entries waiting in the queue.
    pub queue_size: usize,
    /// Configured queue bound.
    pub max_queue_size: usize,
    /// Slots held by running jobs.
    pub active_slots: u32,
    /// Configured concurrency bound.
    pub max_concurrent: u32,
    /// Jobs in each non-evicted status.
    pub pending: usize,
    /// Jobs being processed.
    pub processing: usize,
    /// Jobs waiting for a retry.
    pub retrying: usize,
    /// Jobs that completed.
    pub completed: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Dispatcher counters.
    pub dispatcher: DispatcherStats,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Whether the dispatch loop is running.
    pub ok: bool,
    /// Whether the queue is at capacity.
    pub saturated: bool,
}

/// Shared engine state and the background tasks driving it.
pub struct JobEngine {
    config: EngineConfig,
    ledger: Arc<JobLedger>,
    gate: Arc<ConcurrencyGate>,
    queue: Arc<PriorityDispatchQueue>,
    registry: Arc<ActiveArtifactRegistry>,
    limiter: Arc<RateLimiter>,
    sweeper: Arc<RetentionSweeper>,
    dispatcher: Arc<Dispatcher>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl JobEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        config: EngineConfig,
        ledger: Arc<JobLedger>,
        gate: Arc<ConcurrencyGate>,
        queue: Arc<PriorityDispatchQueue>,
        registry: Arc<ActiveArtifactRegistry>,
        limiter: Arc<RateLimiter>,
        sweeper: Arc<RetentionSweeper>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            ledger,
            gate,
            queue,
            registry,
            limiter,
            sweeper,
            dispatcher,
            maintenance: Mutex::new(None),
        }
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared job ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<JobLedger> {
        &self.ledger
    }

    /// Shared artifact registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ActiveArtifactRegistry> {
        &self.registry
    }

    /// Start the dispatcher and the maintenance task.
    pub fn start(&self) {
        self.dispatcher.start();
        let mut maintenance = self.maintenance.lock();
        if maintenance.as_ref().is_none_or(JoinHandle::is_finished) {
            *maintenance = Some(tokio::spawn(maintenance_loop(
                Arc::clone(&self.ledger),
                Arc::clone(&self.limiter),
                Arc::clone(&self.sweeper),
                self.config.job_ttl(),
                self.config.maintenance_interval(),
                self.config.retention.sweep_interval(),
            )));
        }
        info!(
            max_concurrent = self.gate.max_concurrent(),
            max_queue_size = self.queue.max_size(),
            "job engine started"
        );
    }

    /// Stop background tasks. In-flight jobs run to completion.
    pub async fn stop(&self) {
        self.dispatcher.stop().await;
        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "maintenance task ended abnormally");
                }
            }
        }
        info!("job engine stopped");
    }

    /// Create a pending job. `max_retries` defaults to the configured budget.
    pub fn create_job(&self, params: JobParams, max_retries: Option<u32>) -> Job {
        self.ledger
            .create(params, max_retries.unwrap_or(self.config.default_max_retries))
    }

    /// Queue a pending job, returning its 1-indexed position.
    pub fn enqueue(&self, job_id: JobId, priority: Priority) -> Result<usize, EngineError> {
        let job = self.ledger.get(&job_id).ok_or(EngineError::NotFound(job_id))?;
        if job.status != JobStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id: job_id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        // Recorded first so a dispatcher dequeuing right away retries at this priority.
        self.ledger.record_priority(&job_id, priority)?;
        self.queue.enqueue(job_id, priority)
    }

    /// Create and queue a job in one step.
    ///
    /// When the queue is full the job is discarded again, so a rejected
    /// submission leaves nothing behind.
    pub fn submit(
        &self,
        params: JobParams,
        priority: Priority,
        max_retries: Option<u32>,
    ) -> Result<Job, EngineError> {
        let job = self.create_job(params, max_retries);
        match self.enqueue(job.id, priority) {
            Ok(_) => self.get_job(&job.id).ok_or(EngineError::NotFound(job.id)),
            Err(e) => {
                self.ledger.discard(&job.id);
                Err(e)
            }
        }
    }

    /// Withdraw a job that is still waiting in the queue.
    pub fn cancel_pending(&self, job_id: &JobId) -> bool {
        if !self.queue.remove(job_id) {
            return false;
        }
        self.ledger.discard(job_id);
        true
    }

    /// Pop the next job together with a slot, if one is free.
    #[must_use]
    pub fn dequeue(&self) -> Option<JobId> {
        self.queue.dequeue()
    }

    /// Return a slot taken by `dequeue` or `acquire_direct`.
    pub fn release_slot(&self, job_id: &JobId) -> bool {
        self.gate.release(job_id)
    }

    /// Take a slot without going through the queue.
    pub async fn acquire_direct(&self, job_id: JobId, timeout: Duration) -> bool {
        self.gate.acquire_for_direct_run(job_id, timeout).await
    }

    /// Run a job now on a directly acquired slot.
    ///
    /// Returns the job's final state, or `None` if no slot freed up in time.
    /// A queued job stays queued until the slot is actually held.
    pub async fn run_direct(
        &self,
        job_id: JobId,
        timeout: Duration,
    ) -> Result<Option<Job>, EngineError> {
        self.dispatcher.run_direct(job_id, timeout).await
    }

    /// Job snapshot, with its queue position if pending.
    #[must_use]
    pub fn get_job(&self, job_id: &JobId) -> Option<Job> {
        let mut job = self.ledger.get(job_id)?;
        job.queue_position = if job.status == JobStatus::Pending {
            self.queue.position(job_id)
        } else {
            None
        };
        Some(job)
    }

    /// Jobs filtered by status, newest first.
    #[must_use]
    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        self.ledger
            .list(status, limit)
            .into_iter()
            .map(|mut job| {
                if job.status == JobStatus::Pending {
                    job.queue_position = self.queue.position(&job.id);
                }
                job
            })
            .collect()
    }

    /// Consume one rate limit token for `caller` in `category`.
    pub fn check_rate_limit(&self, caller: &str, category: &str) -> RateDecision {
        self.limiter.check(caller, category)
    }

    /// Protect `path` on behalf of a known job.
    pub fn register_artifact(
        &self,
        job_id: JobId,
        path: impl AsRef<Path>,
    ) -> Result<(), EngineError> {
        if !self.ledger.contains(&job_id) {
            return Err(EngineError::NotFound(job_id));
        }
        self.registry.register(job_id, path);
        Ok(())
    }

    /// Release every path held by `job_id`.
    pub fn unregister_job(&self, job_id: &JobId) -> Vec<PathBuf> {
        self.registry.unregister_job(job_id)
    }

    /// Run a retention sweep now.
    pub fn sweep(&self, dry_run: bool) -> Result<SweepReport, EngineError> {
        self.sweeper.sweep(dry_run)
    }

    /// Whether disk pressure calls for a sweep.
    #[must_use]
    pub fn should_cleanup(&self) -> bool {
        self.sweeper.should_cleanup()
    }

    /// Evict terminal jobs older than the configured TTL.
    pub fn evict_expired(&self) -> usize {
        self.ledger.evict_expired(self.config.job_ttl())
    }

    /// Current load and counters.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            queue_size: self.queue.len(),
            max_queue_size: self.queue.max_size(),
            active_slots: self.gate.in_use(),
            max_concurrent: self.gate.max_concurrent(),
            pending: self.ledger.count_by_status(JobStatus::Pending),
            processing: self.ledger.count_by_status(JobStatus::Processing),
            retrying: self.ledger.count_by_status(JobStatus::Retrying),
            completed: self.ledger.count_by_status(JobStatus::Completed),
            failed: self.ledger.count_by_status(JobStatus::Failed),
            dispatcher: self.dispatcher.stats(),
        }
    }

    /// Health payload.
    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            ok: self.dispatcher.is_running(),
            saturated: self.queue.len() >= self.queue.max_size(),
        }
    }
}

/// Periodic ledger eviction, bucket pruning and retention sweeps.
///
/// A sweep runs when `sweep_interval` has elapsed since the last one or when
/// disk usage crosses the threshold at a maintenance tick.
async fn maintenance_loop(
    ledger: Arc<JobLedger>,
    limiter: Arc<RateLimiter>,
    sweeper: Arc<RetentionSweeper>,
    ttl: Duration,
    interval: Duration,
    sweep_interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_sweep = Instant::now();

    loop {
        ticker.tick().await;
        ledger.evict_expired(ttl);
        limiter.prune_idle();

        let pressure = sweeper.should_cleanup();
        if !pressure && last_sweep.elapsed() < sweep_interval {
            continue;
        }
        if pressure {
            info!(dir = %sweeper.output_dir().display(), "disk usage above threshold, sweeping");
        }
        let pass = Arc::clone(&sweeper);
        match tokio::task::spawn_blocking(move || pass.sweep(false)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "retention sweep failed"),
            Err(e) => warn!(error = %e, "retention sweep task failed"),
        }
        last_sweep = Instant::now();
    }
}
