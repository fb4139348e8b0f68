//! Tests for utility helpers

use prometheus_job_engine::util::{hours, init_json_tracing, init_tracing, now_ms};
use std::time::Duration;

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}

#[test]
fn test_hours() {
    assert_eq!(hours(0), Duration::ZERO);
    assert_eq!(hours(2), Duration::from_secs(7200));
    assert_eq!(hours(u64::MAX), Duration::from_secs(u64::MAX));
}

#[test]
fn test_tracing_init_is_idempotent() {
    init_tracing();
    init_tracing();
    init_json_tracing();
}
