//! Tests for token bucket rate limiting

use prometheus_job_engine::config::CategoryLimit;
use prometheus_job_engine::core::RateLimiter;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

fn limiter() -> RateLimiter {
    let mut limits = HashMap::new();
    limits.insert(
        "download".to_string(),
        CategoryLimit {
            rpm: 60,
            burst_capacity: 5,
        },
    );
    RateLimiter::new(
        limits,
        CategoryLimit {
            rpm: 60,
            burst_capacity: 2,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_burst_then_refill() {
    let limiter = limiter();
    for _ in 0..5 {
        assert!(limiter.check("10.0.0.1", "download").allowed);
    }
    let denied = limiter.check("10.0.0.1", "download");
    assert!(!denied.allowed);
    assert!(denied.retry_after_secs > 0.0 && denied.retry_after_secs <= 1.0);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(limiter.check("10.0.0.1", "download").allowed);
    assert!(!limiter.check("10.0.0.1", "download").allowed);
}

#[test]
fn test_callers_and_categories_are_independent() {
    let limiter = limiter();
    let now = Instant::now();
    for _ in 0..5 {
        assert!(limiter.check_at("a", "download", now).allowed);
    }
    assert!(!limiter.check_at("a", "download", now).allowed);
    assert!(limiter.check_at("b", "download", now).allowed);
    assert!(limiter.check_at("a", "metadata", now).allowed);
    assert_eq!(limiter.bucket_count(), 3);
}

#[test]
fn test_unknown_category_uses_fallback() {
    let limiter = limiter();
    assert_eq!(limiter.limit_for("search").burst_capacity, 2);
    let now = Instant::now();
    assert!(limiter.check_at("a", "search", now).allowed);
    assert!(limiter.check_at("a", "search", now).allowed);
    assert!(!limiter.check_at("a", "search", now).allowed);
}

#[test]
fn test_refill_never_exceeds_capacity() {
    let limiter = limiter();
    let start = Instant::now();
    assert!(limiter.check_at("a", "download", start).allowed);
    let later = start + Duration::from_secs(3600);
    for _ in 0..5 {
        assert!(limiter.check_at("a", "download", later).allowed);
    }
    assert!(!limiter.check_at("a", "download", later).allowed);
}

#[tokio::test(start_paused = true)]
async fn test_prune_idle_drops_full_buckets() {
    let limiter = limiter();
    limiter.check("a", "download");
    limiter.check("b", "download");
    assert_eq!(limiter.prune_idle(), 0);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(limiter.prune_idle(), 2);
    assert_eq!(limiter.bucket_count(), 0);
}
