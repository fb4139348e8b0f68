//! In-process API surface consumed by the boundary layer.

pub mod api;

pub use api::{EngineSnapshot, Health, JobEngine};
