//! Engine configuration structures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;
use crate::util::clock::hours;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "JOB_ENGINE_";

/// Token bucket limits for one request category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimit {
    /// Sustained requests per minute.
    pub rpm: u32,
    /// Bucket capacity; the largest instantaneous burst.
    pub burst_capacity: u32,
}

impl CategoryLimit {
    fn validate(&self, name: &str) -> Result<(), String> {
        if self.rpm == 0 {
            return Err(format!("rate limit `{name}`: rpm must be greater than 0"));
        }
        if self.burst_capacity == 0 {
            return Err(format!(
                "rate limit `{name}`: burst_capacity must be greater than 0"
            ));
        }
        Ok(())
    }
}

/// Output retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Directory holding job output files.
    pub output_dir: PathBuf,
    /// Files older than this are eligible for deletion.
    pub retention_age_hours: u64,
    /// Disk usage percentage that triggers an immediate sweep.
    pub cleanup_threshold_percent: f64,
    /// Seconds between scheduled sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            retention_age_hours: 24,
            cleanup_threshold_percent: 80.0,
            sweep_interval_secs: 3600,
        }
    }
}

impl RetentionConfig {
    /// Retention age as a duration.
    #[must_use]
    pub const fn retention_age(&self) -> Duration {
        hours(self.retention_age_hours)
    }

    /// Sweep interval as a duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate retention values.
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_age_hours == 0 {
            return Err("retention_age_hours must be greater than 0".into());
        }
        if !(self.cleanup_threshold_percent > 0.0 && self.cleanup_threshold_percent <= 100.0) {
            return Err("cleanup_threshold_percent must be in (0, 100]".into());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global bound on concurrently running jobs.
    pub max_concurrent: u32,
    /// Maximum queued jobs before enqueue is rejected.
    pub max_queue_size: usize,
    /// Hours a terminal job stays in the ledger.
    pub job_ttl_hours: u64,
    /// Retry budget for jobs created without an explicit one.
    pub default_max_retries: u32,
    /// Dispatcher idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Seconds between maintenance passes (eviction, pressure checks).
    pub maintenance_interval_secs: u64,
    /// Per-category rate limits.
    pub rate_limits: HashMap<String, CategoryLimit>,
    /// Limit for categories absent from `rate_limits`.
    pub fallback_limit: CategoryLimit,
    /// Output retention.
    pub retention: RetentionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        rate_limits.insert(
            "metadata".to_string(),
            CategoryLimit {
                rpm: 100,
                burst_capacity: 20,
            },
        );
        rate_limits.insert(
            "download".to_string(),
            CategoryLimit {
                rpm: 10,
                burst_capacity: 20,
            },
        );
        Self {
            max_concurrent: u32::try_from(num_cpus::get()).unwrap_or(u32::MAX).max(1),
            max_queue_size: 100,
            job_ttl_hours: 24,
            default_max_retries: crate::core::DEFAULT_MAX_RETRIES,
            poll_interval_ms: 100,
            maintenance_interval_secs: 300,
            rate_limits,
            fallback_limit: CategoryLimit {
                rpm: 60,
                burst_capacity: 10,
            },
            retention: RetentionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Job TTL as a duration.
    #[must_use]
    pub const fn job_ttl(&self) -> Duration {
        hours(self.job_ttl_hours)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maintenance interval as a duration.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Validate all values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than 0".into());
        }
        if self.job_ttl_hours == 0 {
            return Err("job_ttl_hours must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.maintenance_interval_secs == 0 {
            return Err("maintenance_interval_secs must be greater than 0".into());
        }
        for (name, limit) in &self.rate_limits {
            limit.validate(name)?;
        }
        self.fallback_limit.validate("fallback")?;
        self.retention
            .validate()
            .map_err(|e| format!("retention invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `JOB_ENGINE_*`
    /// environment variables, loading a `.env` file first if one exists.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        override_from_env(&mut cfg.max_concurrent, "MAX_CONCURRENT")?;
        override_from_env(&mut cfg.max_queue_size, "MAX_QUEUE_SIZE")?;
        override_from_env(&mut cfg.job_ttl_hours, "JOB_TTL_HOURS")?;
        override_from_env(&mut cfg.default_max_retries, "MAX_RETRIES")?;
        override_from_env(&mut cfg.poll_interval_ms, "POLL_INTERVAL_MS")?;
        override_from_env(&mut cfg.maintenance_interval_secs, "MAINTENANCE_INTERVAL_SECS")?;
        override_from_env(&mut cfg.retention.output_dir, "OUTPUT_DIR")?;
        override_from_env(&mut cfg.retention.retention_age_hours, "RETENTION_AGE_HOURS")?;
        override_from_env(
            &mut cfg.retention.cleanup_threshold_percent,
            "CLEANUP_THRESHOLD_PERCENT",
        )?;
        override_from_env(&mut cfg.retention.sweep_interval_secs, "SWEEP_INTERVAL_SECS")?;

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn override_from_env<T>(slot: &mut T, key: &str) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let name = format!("{ENV_PREFIX}{key}");
    if let Ok(raw) = std::env::var(&name) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}"))?;
    }
    Ok(())
}
