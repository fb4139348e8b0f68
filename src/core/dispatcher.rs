//! Dispatch loop and retry protocol.
//!
//! One loop task pulls job ids from the queue; each dequeued job runs in its
//! own task so a slow operation never blocks the next dequeue. The queue only
//! hands out a job together with a gate slot, and every processing task
//! returns that slot through a drop guard, including on panic.
//!
//! # Design
//!
//! - **Never dies on a job**: operations run in a nested task; a panic
//!   surfaces as a `JoinError` and fails only that job
//! - **No stuck retries**: a retry whose re-enqueue is rejected fails the job
//! - **Graceful stop**: stopping aborts the loop only; in-flight jobs finish

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::audit::{AttemptOutcome, AttemptRecord, AuditSink};
use crate::core::operation::{JobContext, ProgressReporter, WorkerOperation};
use crate::core::{
    ConcurrencyGate, EngineError, Job, JobId, JobLedger, OperationError, Priority,
    ResultArtifact, DEFAULT_PRIORITY,
};
use crate::infra::{ActiveArtifactRegistry, DispatchQueue};

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Processing attempts started.
    pub attempts: u64,
    /// Attempts that completed the job.
    pub completed: u64,
    /// Attempts that scheduled a retry.
    pub retried: u64,
    /// Attempts that failed the job.
    pub failed: u64,
    /// Attempts abandoned because the job was not dispatchable.
    pub skipped: u64,
    /// Jobs currently being processed.
    pub in_flight: u64,
}

#[derive(Debug, Default)]
struct DispatcherCounters {
    attempts: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    in_flight: AtomicU64,
}

impl DispatcherCounters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    fn count(&self, outcome: AttemptOutcome) {
        let counter = match outcome {
            AttemptOutcome::Completed => &self.completed,
            AttemptOutcome::Retried => &self.retried,
            AttemptOutcome::Failed => &self.failed,
            AttemptOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the gate slot for a job when dropped.
struct SlotGuard {
    gate: Arc<ConcurrencyGate>,
    job_id: JobId,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.gate.release(&self.job_id);
    }
}

/// What to do after an attempt, once its slot is returned.
enum NextStep {
    Done(AttemptOutcome),
    Requeue { priority: Priority, error: String },
}

/// Worker pool loop driving jobs from the queue through the operation.
pub struct Dispatcher {
    ledger: Arc<JobLedger>,
    queue: Arc<dyn DispatchQueue>,
    gate: Arc<ConcurrencyGate>,
    registry: Arc<ActiveArtifactRegistry>,
    operation: Arc<dyn WorkerOperation>,
    audit: Arc<dyn AuditSink>,
    counters: DispatcherCounters,
    poll_interval: Duration,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Wire a dispatcher over shared components.
    ///
    /// `queue` must draw its slots from `gate`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        ledger: Arc<JobLedger>,
        queue: Arc<dyn DispatchQueue>,
        gate: Arc<ConcurrencyGate>,
        registry: Arc<ActiveArtifactRegistry>,
        operation: Arc<dyn WorkerOperation>,
        audit: Arc<dyn AuditSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            queue,
            gate,
            registry,
            operation,
            audit,
            counters: DispatcherCounters::default(),
            poll_interval,
            loop_handle: Mutex::new(None),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// Whether the dispatch loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the dispatch loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut handle = self.loop_handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let this = Arc::clone(self);
        *handle = Some(tokio::spawn(this.run_loop()));
        true
    }

    /// Stop the dispatch loop and wait for it to exit.
    ///
    /// Jobs already dequeued keep running to completion and release their
    /// slots normally.
    pub async fn stop(&self) {
        let handle = self.loop_handle.lock().take();
        let Some(handle) = handle else {
            return;
        };
        handle.abort();
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "dispatch loop ended abnormally"),
        }
        info!(in_flight = self.counters.in_flight.load(Ordering::Relaxed), "dispatcher stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        info!(
            max_concurrent = self.gate.max_concurrent(),
            poll_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "dispatcher started"
        );
        loop {
            match self.queue.dequeue() {
                Some(job_id) => {
                    let slot = SlotGuard {
                        gate: Arc::clone(&self.gate),
                        job_id,
                    };
                    tokio::spawn(Arc::clone(&self).process(job_id, slot, true));
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Run a job immediately on a directly acquired slot, bypassing the
    /// queue.
    ///
    /// Returns `Ok(None)` when no slot frees up within `timeout`; a queued
    /// job then keeps its queue entry. Once the slot is held the job leaves
    /// the queue, and a retriable failure is terminal.
    pub async fn run_direct(
        self: &Arc<Self>,
        job_id: JobId,
        timeout: Duration,
    ) -> Result<Option<Job>, EngineError> {
        if !self.ledger.contains(&job_id) {
            return Err(EngineError::NotFound(job_id));
        }
        if !self.gate.acquire_for_direct_run(job_id, timeout).await {
            return Ok(None);
        }
        let slot = SlotGuard {
            gate: Arc::clone(&self.gate),
            job_id,
        };
        self.queue.remove(&job_id);
        // Own task so the slot is still returned if the caller is cancelled.
        let this = Arc::clone(self);
        if let Err(e) = tokio::spawn(this.process(job_id, slot, false)).await {
            error!(job_id = %job_id, error = %e, "direct run task failed");
        }
        Ok(self.ledger.get(&job_id))
    }

    async fn process(self: Arc<Self>, job_id: JobId, slot: SlotGuard, allow_requeue: bool) {
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let (attempt, next) = self.run_attempt(job_id, allow_requeue).await;
        drop(slot);

        let outcome = match next {
            NextStep::Done(outcome) => outcome,
            NextStep::Requeue { priority, error } => self.requeue(job_id, priority, &error),
        };

        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        self.counters.count(outcome);
        self.audit
            .record(AttemptRecord::new(job_id, attempt, outcome, started.elapsed()));
    }

    async fn run_attempt(&self, job_id: JobId, allow_requeue: bool) -> (u32, NextStep) {
        let job = match self.ledger.mark_processing(&job_id) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "dequeued job is not dispatchable");
                return (0, NextStep::Done(AttemptOutcome::Skipped));
            }
        };
        let attempt = job.retry_count + 1;
        let ctx = JobContext {
            job_id,
            attempt,
            params: job.params.clone(),
            progress: ProgressReporter::new(job_id, Arc::clone(&self.ledger)),
        };

        debug!(job_id = %job_id, attempt, "invoking worker operation");
        let operation = Arc::clone(&self.operation);
        let result = match tokio::spawn(async move { operation.execute(ctx).await }).await {
            Ok(result) => result,
            Err(e) => Err(OperationError::Unexpected(anyhow::anyhow!(
                "worker operation aborted: {e}"
            ))),
        };

        (attempt, self.apply_result(&job, result, allow_requeue))
    }

    fn apply_result(
        &self,
        job: &Job,
        result: Result<ResultArtifact, OperationError>,
        allow_requeue: bool,
    ) -> NextStep {
        let outcome = match result {
            Ok(artifact) => {
                self.registry.register(job.id, &artifact.path);
                match self.ledger.mark_completed(&job.id, artifact) {
                    Ok(_) => AttemptOutcome::Completed,
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "could not record completion");
                        AttemptOutcome::Failed
                    }
                }
            }
            Err(OperationError::Retriable(msg)) if allow_requeue => {
                return self.schedule_retry(job, &msg);
            }
            Err(OperationError::Retriable(msg)) => {
                self.fail(&job.id, &format!("retriable error on direct run: {msg}"))
            }
            Err(OperationError::NonRetriable(msg)) => self.fail(&job.id, &msg),
            Err(OperationError::Unexpected(e)) => {
                error!(job_id = %job.id, error = ?e, "unexpected worker operation error");
                self.fail(&job.id, &format!("unexpected error: {e:#}"))
            }
        };
        NextStep::Done(outcome)
    }

    fn schedule_retry(&self, job: &Job, msg: &str) -> NextStep {
        if !job.has_retry_budget() {
            let reason = format!(
                "retries exhausted after {} attempts: {msg}",
                job.retry_count + 1
            );
            return NextStep::Done(self.fail(&job.id, &reason));
        }
        match self.ledger.mark_retrying(&job.id, msg) {
            Ok(_) => NextStep::Requeue {
                priority: job.priority.unwrap_or(DEFAULT_PRIORITY),
                error: msg.to_string(),
            },
            Err(e) => {
                error!(job_id = %job.id, error = %e, "could not schedule retry");
                NextStep::Done(self.fail(&job.id, &format!("{msg}; retry rejected: {e}")))
            }
        }
    }

    fn requeue(&self, job_id: JobId, priority: Priority, error: &str) -> AttemptOutcome {
        match self.queue.enqueue(job_id, priority) {
            Ok(position) => {
                debug!(job_id = %job_id, priority, position, "retry re-enqueued");
                AttemptOutcome::Retried
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "retry could not be re-enqueued");
                self.fail(&job_id, &format!("{error}; retry could not be scheduled: {e}"))
            }
        }
    }

    fn fail(&self, job_id: &JobId, reason: &str) -> AttemptOutcome {
        if let Err(e) = self.ledger.mark_failed(job_id, reason) {
            error!(job_id = %job_id, error = %e, "could not record failure");
        }
        AttemptOutcome::Failed
    }
}
