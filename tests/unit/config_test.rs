//! Tests for configuration validation

use prometheus_job_engine::config::{CategoryLimit, EngineConfig, RetentionConfig};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.max_concurrent >= 1);
    assert_eq!(cfg.max_queue_size, 100);
    assert_eq!(cfg.job_ttl(), Duration::from_secs(24 * 3600));
    assert_eq!(cfg.default_max_retries, 3);
}

#[test]
fn test_default_rate_limits() {
    let cfg = EngineConfig::default();
    assert_eq!(
        cfg.rate_limits["metadata"],
        CategoryLimit {
            rpm: 100,
            burst_capacity: 20
        }
    );
    assert_eq!(cfg.rate_limits["download"].rpm, 10);
}

#[test]
fn test_zero_concurrency_rejected() {
    let cfg = EngineConfig {
        max_concurrent: 0,
        ..EngineConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("max_concurrent"));
}

#[test]
fn test_zero_rpm_rejected() {
    let mut cfg = EngineConfig::default();
    cfg.rate_limits.insert(
        "search".into(),
        CategoryLimit {
            rpm: 0,
            burst_capacity: 5,
        },
    );
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("search"));
}

#[test]
fn test_retention_threshold_out_of_range() {
    let cfg = EngineConfig {
        retention: RetentionConfig {
            cleanup_threshold_percent: 150.0,
            ..RetentionConfig::default()
        },
        ..EngineConfig::default()
    };
    assert!(cfg.validate().unwrap_err().contains("retention"));
}

#[test]
fn test_from_json_str_partial_document() {
    let json = r#"{
        "max_concurrent": 2,
        "max_queue_size": 10,
        "retention": { "output_dir": "/srv/out", "retention_age_hours": 6 }
    }"#;
    let cfg = EngineConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.max_concurrent, 2);
    assert_eq!(cfg.max_queue_size, 10);
    assert_eq!(cfg.retention.retention_age(), Duration::from_secs(6 * 3600));
    assert_eq!(cfg.retention.sweep_interval_secs, 3600);
    assert_eq!(cfg.poll_interval_ms, 100);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(EngineConfig::from_json_str(r#"{"max_queue_size": 0}"#).is_err());
    assert!(EngineConfig::from_json_str("not json").is_err());
}

#[test]
fn test_huge_hour_values_saturate() {
    let cfg = EngineConfig::from_json_str(
        r#"{ "job_ttl_hours": 18446744073709551615, "retention": { "retention_age_hours": 18446744073709551615 } }"#,
    )
    .unwrap();
    assert_eq!(cfg.job_ttl(), Duration::from_secs(u64::MAX));
    assert_eq!(cfg.retention.retention_age(), Duration::from_secs(u64::MAX));
}
