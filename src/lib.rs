//! # Prometheus Job Engine
//!
//! An in-process engine for long-running background jobs.
//!
//! Jobs are created in a ledger, queued by priority and executed by a
//! pluggable [`WorkerOperation`](core::WorkerOperation) under a fixed
//! concurrency bound. Failed attempts are retried through the queue while
//! the job's retry budget lasts. Output files written by jobs are protected
//! from the retention sweeper for as long as their job stays in the ledger.
//!
//! ## Key Features
//!
//! - **Priority Dispatch**: lower priority values run first, FIFO within a priority
//! - **Bounded Concurrency**: a queue hands out a job only together with a slot
//! - **Retry Protocol**: retriable failures re-enter the queue at their original priority
//! - **Rate Limiting**: token buckets per caller and request category
//! - **Retention**: age and disk pressure driven cleanup that never deletes live outputs
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_job_engine::builders::JobEngineBuilder;
//! use prometheus_job_engine::config::EngineConfig;
//!
//! let engine = JobEngineBuilder::new(EngineConfig::from_env()?)
//!     .operation(Arc::new(MyDownloader))
//!     .build()?;
//! engine.start();
//!
//! let job = engine.submit(params, 5, None)?;
//! // ... poll engine.get_job(&job.id) ...
//! engine.stop().await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core engine components: jobs, ledger, gate, dispatcher, limiter, sweeper.
pub mod core;
/// Configuration models for the engine, rate limits and retention.
pub mod config;
/// Builders to construct an engine from configuration.
pub mod builders;
/// Infrastructure adapters for the dispatch queue, artifacts and volumes.
pub mod infra;
/// Engine facade consumed by the boundary layer.
pub mod runtime;
/// Shared utilities.
pub mod util;
