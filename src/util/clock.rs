//! Wall-clock helpers.
//!
//! Job timestamps are stored as milliseconds since the Unix epoch so they
//! serialize cleanly and compare without timezone handling.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// A clock set before 1970 yields `0` rather than panicking.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// Convert an hour count into a `Duration`, saturating on overflow.
#[must_use]
pub const fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}
