//! Wires the engine components together from an [`EngineConfig`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::{
    AuditSink, ConcurrencyGate, Dispatcher, EngineError, JobLedger, RateLimiter,
    RetentionSweeper, TracingAuditSink, WorkerOperation,
};
use crate::infra::{ActiveArtifactRegistry, PriorityDispatchQueue, StatvfsProbe, VolumeProbe};
use crate::runtime::JobEngine;

/// Builder for a [`JobEngine`].
///
/// The worker operation is required. The audit sink defaults to
/// [`TracingAuditSink`] and the volume probe to [`StatvfsProbe`].
pub struct JobEngineBuilder {
    config: EngineConfig,
    operation: Option<Arc<dyn WorkerOperation>>,
    audit: Option<Arc<dyn AuditSink>>,
    probe: Option<Arc<dyn VolumeProbe>>,
}

impl JobEngineBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            operation: None,
            audit: None,
            probe: None,
        }
    }

    /// Configuration the engine will be built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Operation invoked for every job.
    #[must_use]
    pub fn operation(mut self, operation: Arc<dyn WorkerOperation>) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Destination for per-attempt records.
    #[must_use]
    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Disk usage source for pressure-triggered sweeps.
    #[must_use]
    pub fn volume_probe(mut self, probe: Arc<dyn VolumeProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// Background tasks are not started; call [`JobEngine::start`].
    pub fn build(self) -> Result<JobEngine, EngineError> {
        self.config
            .validate()
            .map_err(|e| EngineError::Config(format!("config invalid: {e}")))?;
        let operation = self
            .operation
            .ok_or_else(|| EngineError::Config("worker operation not set".into()))?;
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditSink));
        let probe = self.probe.unwrap_or_else(|| Arc::new(StatvfsProbe));

        let cfg = self.config;
        let ledger = Arc::new(JobLedger::new());
        let registry = Arc::new(ActiveArtifactRegistry::new());
        ledger.subscribe_evictions(registry.clone());

        let gate = Arc::new(ConcurrencyGate::new(cfg.max_concurrent));
        let queue = Arc::new(PriorityDispatchQueue::new(
            cfg.max_queue_size,
            Arc::clone(&gate),
        ));
        let limiter = Arc::new(RateLimiter::new(
            cfg.rate_limits.clone(),
            cfg.fallback_limit,
        ));
        let sweeper = Arc::new(RetentionSweeper::new(
            &cfg.retention,
            Arc::clone(&registry),
            probe,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&ledger),
            queue.clone(),
            Arc::clone(&gate),
            Arc::clone(&registry),
            operation,
            audit,
            cfg.poll_interval(),
        ));

        Ok(JobEngine::from_parts(
            cfg, ledger, gate, queue, registry, limiter, sweeper, dispatcher,
        ))
    }
}
