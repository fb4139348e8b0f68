//! Tests for the priority dispatch queue and its slot coupling

use prometheus_job_engine::core::{ConcurrencyGate, EngineError, JobId};
use prometheus_job_engine::infra::{DispatchQueue, PriorityDispatchQueue};
use std::sync::Arc;

fn queue(max_size: usize, max_concurrent: u32) -> PriorityDispatchQueue {
    PriorityDispatchQueue::new(max_size, Arc::new(ConcurrencyGate::new(max_concurrent)))
}

#[test]
fn test_lower_priority_value_runs_first() {
    let q = queue(10, 10);
    let ids: Vec<JobId> = (0..3).map(|_| JobId::new()).collect();
    q.enqueue(ids[0], 10).unwrap();
    q.enqueue(ids[1], 1).unwrap();
    q.enqueue(ids[2], 5).unwrap();

    assert_eq!(q.snapshot(), vec![ids[1], ids[2], ids[0]]);
    assert_eq!(q.dequeue(), Some(ids[1]));
    assert_eq!(q.dequeue(), Some(ids[2]));
    assert_eq!(q.dequeue(), Some(ids[0]));
    assert!(q.is_empty());
}

#[test]
fn test_equal_priority_is_fifo() {
    let q = queue(10, 10);
    let ids: Vec<JobId> = (0..5).map(|_| JobId::new()).collect();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(q.enqueue(*id, 5).unwrap(), i + 1);
    }
    for id in &ids {
        assert_eq!(q.dequeue(), Some(*id));
    }
}

#[test]
fn test_full_queue_rejects() {
    let q = queue(2, 1);
    q.enqueue(JobId::new(), 5).unwrap();
    q.enqueue(JobId::new(), 5).unwrap();
    let err = q.enqueue(JobId::new(), 1).unwrap_err();
    assert!(matches!(err, EngineError::QueueFull { max: 2 }));
    assert_eq!(q.len(), 2);
}

#[test]
fn test_reenqueue_returns_existing_position() {
    let q = queue(2, 1);
    let a = JobId::new();
    q.enqueue(a, 5).unwrap();
    q.enqueue(JobId::new(), 5).unwrap();
    assert_eq!(q.enqueue(a, 1).unwrap(), 1);
    assert_eq!(q.len(), 2);
}

#[test]
fn test_dequeue_waits_for_slot() {
    let gate = Arc::new(ConcurrencyGate::new(1));
    let q = PriorityDispatchQueue::new(10, Arc::clone(&gate));
    let a = JobId::new();
    let b = JobId::new();
    q.enqueue(a, 5).unwrap();
    q.enqueue(b, 5).unwrap();

    assert_eq!(q.dequeue(), Some(a));
    assert_eq!(q.dequeue(), None);
    assert_eq!(q.position(&b), Some(1));

    assert!(gate.release(&a));
    assert_eq!(q.dequeue(), Some(b));
    assert!(gate.is_held_by(&b));
}

#[test]
fn test_positions_shift_after_removal() {
    let q = queue(10, 10);
    let a = JobId::new();
    let b = JobId::new();
    let c = JobId::new();
    q.enqueue(a, 5).unwrap();
    q.enqueue(b, 5).unwrap();
    q.enqueue(c, 5).unwrap();

    assert!(q.remove(&a));
    assert!(!q.remove(&a));
    assert_eq!(q.position(&b), Some(1));
    assert_eq!(q.position(&c), Some(2));
    assert_eq!(q.position(&a), None);
}

#[test]
fn test_direct_slot_holder_is_passed_over() {
    let gate = Arc::new(ConcurrencyGate::new(4));
    let q = PriorityDispatchQueue::new(10, Arc::clone(&gate));
    let direct = JobId::new();
    let queued = JobId::new();
    q.enqueue(direct, 0).unwrap();
    q.enqueue(queued, 9).unwrap();
    assert!(gate.try_acquire(direct));

    assert_eq!(q.dequeue(), Some(queued));
    assert_eq!(q.len(), 1);
    assert!(matches!(q.enqueue(JobId::new(), 5), Ok(2)));
    assert!(matches!(
        PriorityDispatchQueue::new(10, Arc::clone(&gate)).enqueue(direct, 1),
        Err(EngineError::SlotHeld(_))
    ));
}
