//! Global concurrency gate shared by the queued and direct execution paths.
//!
//! Slot accounting uses a lock-free `AtomicU32` with a CAS reservation loop;
//! the set of holders is tracked separately so every release matches
//! exactly one acquisition.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::core::job::JobId;

/// Counting gate of size `max_concurrent`.
pub struct ConcurrencyGate {
    max_concurrent: u32,
    /// Number of slots currently held.
    in_use: AtomicU32,
    /// Jobs currently holding a slot.
    holders: Mutex<HashSet<JobId>>,
    /// Signaled whenever a slot is released.
    released: Notify,
}

impl ConcurrencyGate {
    /// Create a gate with `max_concurrent` slots.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent,
            in_use: AtomicU32::new(0),
            holders: Mutex::new(HashSet::new()),
            released: Notify::new(),
        }
    }

    /// Configured bound.
    #[must_use]
    pub const fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    /// Slots currently held (lock-free read).
    #[must_use]
    pub fn in_use(&self) -> u32 {
        self.in_use.load(Ordering::Acquire)
    }

    /// Slots currently free (lock-free read).
    #[must_use]
    pub fn available(&self) -> u32 {
        self.max_concurrent.saturating_sub(self.in_use())
    }

    /// Whether `id` currently holds a slot.
    #[must_use]
    pub fn is_held_by(&self, id: &JobId) -> bool {
        self.holders.lock().contains(id)
    }

    /// Reserve one unit with a CAS loop. Returns false when the gate is full.
    fn try_reserve(&self) -> bool {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrent {
                return false;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Try to take a slot for `id` without waiting.
    ///
    /// Fails when the gate is full or `id` already holds a slot.
    pub fn try_acquire(&self, id: JobId) -> bool {
        let mut holders = self.holders.lock();
        if holders.contains(&id) {
            warn!(job_id = %id, "slot already held by job");
            return false;
        }
        if !self.try_reserve() {
            return false;
        }
        holders.insert(id);
        debug!(job_id = %id, in_use = self.in_use(), "slot acquired");
        true
    }

    /// Take a slot for immediate, queue-bypassing execution.
    ///
    /// Waits up to `timeout` for a release. Counts against the same bound as
    /// queued dispatch and has no reservation of its own, so a stream of
    /// direct runs can keep queued jobs waiting.
    pub async fn acquire_for_direct_run(&self, id: JobId, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register interest before checking so a release in between is not lost.
            notified.as_mut().enable();

            if self.try_acquire(id) {
                return true;
            }
            if self.is_held_by(&id) {
                return false;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                debug!(job_id = %id, "direct run timed out waiting for a slot");
                return false;
            }
        }
    }

    /// Return the slot held by `id`.
    ///
    /// Returns false (and changes nothing) if `id` holds no slot, so a
    /// duplicate release can never inflate capacity.
    pub fn release(&self, id: &JobId) -> bool {
        let removed = self.holders.lock().remove(id);
        if !removed {
            warn!(job_id = %id, "release without matching acquisition ignored");
            return false;
        }
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        debug!(job_id = %id, in_use = self.in_use(), "slot released");
        self.released.notify_one();
        true
    }
}
