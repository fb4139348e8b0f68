//! In-memory priority dispatch queue with live position tracking.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::DispatchQueue;
use crate::core::{ConcurrencyGate, EngineError, JobId, Priority};

/// Heap entry ordered by priority (lowest number first), then FIFO.
#[derive(Debug, Clone)]
struct QueueEntry {
    priority: Priority,
    enqueued_at: Instant,
    /// Insertion counter; breaks ties between equal instants.
    seq: u64,
    id: JobId,
}

impl QueueEntry {
    fn key(&self) -> (Priority, Instant, u64) {
        (self.priority, self.enqueued_at, self.seq)
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and the smallest key must pop first.
        other.key().cmp(&self.key())
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    positions: HashMap<JobId, usize>,
    next_seq: u64,
}

impl QueueState {
    /// Rebuild the 1-indexed position map in dispatch order.
    fn recompute_positions(&mut self) {
        let mut ordered: Vec<&QueueEntry> = self.heap.iter().collect();
        ordered.sort_by_key(|entry| entry.key());
        self.positions = ordered
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| (entry.id, idx + 1))
            .collect();
    }
}

/// Bounded min-priority queue of job ids.
///
/// Positions are recomputed on every mutation so reads are O(1) and always
/// reflect true dispatch order. `dequeue` pops only when the shared
/// [`ConcurrencyGate`] grants a slot, and both happen under one lock.
pub struct PriorityDispatchQueue {
    max_size: usize,
    gate: Arc<ConcurrencyGate>,
    state: Mutex<QueueState>,
}

impl PriorityDispatchQueue {
    /// Create a queue holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize, gate: Arc<ConcurrencyGate>) -> Self {
        Self {
            max_size,
            gate,
            state: Mutex::new(QueueState {
                heap: BinaryHeap::with_capacity(max_size.min(1024)),
                ..QueueState::default()
            }),
        }
    }

    /// Configured maximum size.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// The gate dequeue draws slots from.
    #[must_use]
    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Queued ids in dispatch order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<JobId> {
        let state = self.state.lock();
        let mut ordered: Vec<(usize, JobId)> =
            state.positions.iter().map(|(id, pos)| (*pos, *id)).collect();
        ordered.sort_unstable_by_key(|(pos, _)| *pos);
        ordered.into_iter().map(|(_, id)| id).collect()
    }
}

impl DispatchQueue for PriorityDispatchQueue {
    fn enqueue(&self, id: JobId, priority: Priority) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        if let Some(position) = state.positions.get(&id) {
            return Ok(*position);
        }
        if self.gate.is_held_by(&id) {
            warn!(job_id = %id, "enqueue rejected: job already holds a slot");
            return Err(EngineError::SlotHeld(id));
        }
        if state.heap.len() >= self.max_size {
            warn!(job_id = %id, max = self.max_size, "enqueue rejected: queue full");
            return Err(EngineError::QueueFull { max: self.max_size });
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueueEntry {
            priority,
            enqueued_at: Instant::now(),
            seq,
            id,
        });
        state.recompute_positions();

        let position = state.positions.get(&id).copied().unwrap_or(state.heap.len());
        debug!(job_id = %id, priority, position, "job enqueued");
        Ok(position)
    }

    fn dequeue(&self) -> Option<JobId> {
        let mut state = self.state.lock();
        // Entries whose job took a slot directly stay queued but are passed over.
        let mut passed_over = Vec::new();
        let mut taken = None;
        while let Some(id) = state.heap.peek().map(|entry| entry.id) {
            if self.gate.is_held_by(&id) {
                passed_over.extend(state.heap.pop());
                continue;
            }
            if self.gate.try_acquire(id) {
                state.heap.pop();
                taken = Some(id);
            }
            break;
        }
        state.heap.extend(passed_over);

        let id = taken?;
        state.recompute_positions();
        debug!(job_id = %id, remaining = state.heap.len(), "job dequeued");
        Some(id)
    }

    fn remove(&self, id: &JobId) -> bool {
        let mut state = self.state.lock();
        if state.positions.remove(id).is_none() {
            return false;
        }
        state.heap.retain(|entry| entry.id != *id);
        state.recompute_positions();
        debug!(job_id = %id, "job removed from queue");
        true
    }

    fn position(&self, id: &JobId) -> Option<usize> {
        self.state.lock().positions.get(id).copied()
    }

    fn len(&self) -> usize {
        self.state.lock().heap.len()
    }
}
