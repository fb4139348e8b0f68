//! Configuration models for the engine, rate limits and retention.

pub mod engine;

pub use engine::{CategoryLimit, EngineConfig, RetentionConfig};
