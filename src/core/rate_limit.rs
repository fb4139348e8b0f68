//! Per-caller, per-category token bucket rate limiting.
//!
//! Buckets are created lazily at full capacity on first use, so a caller's
//! first burst up to `burst_capacity` always succeeds. Refill is continuous
//! at `rpm / 60` tokens per second.
//!
//! The limiter never fails: it answers with a decision and a wait hint and
//! leaves denial handling to the caller.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CategoryLimit;

/// Token bucket state.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    #[must_use]
    pub fn new(limit: CategoryLimit, now: Instant) -> Self {
        let capacity = f64::from(limit.burst_capacity);
        Self {
            capacity,
            refill_per_sec: f64::from(limit.rpm) / 60.0,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Tokens currently available.
    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).clamp(0.0, self.capacity);
        self.last_refill = now;
    }

    /// Refill, then take one token if available.
    pub fn try_consume(&mut self, now: Instant) -> RateDecision {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return RateDecision::allow();
        }
        let retry_after_secs = if self.refill_per_sec > 0.0 {
            (1.0 - self.tokens) / self.refill_per_sec
        } else {
            f64::INFINITY
        };
        RateDecision {
            allowed: false,
            retry_after_secs,
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Seconds until one token will be available; `0.0` when allowed.
    pub retry_after_secs: f64,
}

impl RateDecision {
    const fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0.0,
        }
    }
}

/// Token bucket limiter keyed by `(caller, category)`.
pub struct RateLimiter {
    limits: HashMap<String, CategoryLimit>,
    fallback: CategoryLimit,
    buckets: DashMap<(String, String), TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter from per-category limits.
    ///
    /// Categories missing from `limits` use `fallback`.
    #[must_use]
    pub fn new(limits: HashMap<String, CategoryLimit>, fallback: CategoryLimit) -> Self {
        Self {
            limits,
            fallback,
            buckets: DashMap::new(),
        }
    }

    /// Limit applied to `category`.
    #[must_use]
    pub fn limit_for(&self, category: &str) -> CategoryLimit {
        self.limits.get(category).copied().unwrap_or(self.fallback)
    }

    /// Check and consume one token for `caller` in `category`.
    pub fn check(&self, caller: &str, category: &str) -> RateDecision {
        self.check_at(caller, category, Instant::now())
    }

    /// [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, caller: &str, category: &str, now: Instant) -> RateDecision {
        let limit = self.limit_for(category);
        let mut bucket = self
            .buckets
            .entry((caller.to_string(), category.to_string()))
            .or_insert_with(|| TokenBucket::new(limit, now));
        let decision = bucket.try_consume(now);
        if !decision.allowed {
            debug!(
                caller,
                category,
                retry_after_secs = decision.retry_after_secs,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that have refilled to capacity; they are equivalent to
    /// freshly created ones.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.refill(now);
            bucket.tokens < bucket.capacity
        });
        before.saturating_sub(self.buckets.len())
    }
}
