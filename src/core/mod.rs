//! Core engine components: job ledger, concurrency gate, dispatcher,
//! rate limiter and retention sweeper.

pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod job;
pub mod ledger;
pub mod operation;
pub mod rate_limit;
pub mod retention;

pub use audit::{AttemptOutcome, AttemptRecord, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use dispatcher::{Dispatcher, DispatcherStats};
pub use error::{AppResult, EngineError, OperationError};
pub use gate::ConcurrencyGate;
pub use job::{
    Job, JobId, JobParams, JobStatus, JobTimestamps, Priority, ResultArtifact,
    DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY,
};
pub use ledger::{EvictionListener, JobLedger};
pub use operation::{JobContext, ProgressReporter, WorkerOperation};
pub use rate_limit::{RateDecision, RateLimiter, TokenBucket};
pub use retention::{RetentionSweeper, SweepReport};
