//! Dispatch queue backends.

pub mod memory;

pub use memory::PriorityDispatchQueue;

use crate::core::{EngineError, JobId, Priority};

/// Abstraction the dispatcher pulls work from.
pub trait DispatchQueue: Send + Sync {
    /// Queue `id` at `priority`, returning its 1-indexed position.
    ///
    /// Enqueueing an id that is already queued returns its current position.
    fn enqueue(&self, id: JobId, priority: Priority) -> Result<usize, EngineError>;
    /// Pop the next entry, but only together with a concurrency slot for it.
    fn dequeue(&self) -> Option<JobId>;
    /// Drop a still-queued entry.
    fn remove(&self, id: &JobId) -> bool;
    /// Current 1-indexed position of a queued id.
    fn position(&self, id: &JobId) -> Option<usize>;
    /// Number of queued entries.
    fn len(&self) -> usize;
    /// Whether nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
