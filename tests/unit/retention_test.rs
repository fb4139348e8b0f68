//! Tests for retention sweeps against a real directory

use prometheus_job_engine::config::RetentionConfig;
use prometheus_job_engine::core::{EvictionListener, JobId, RetentionSweeper};
use prometheus_job_engine::infra::{ActiveArtifactRegistry, FixedProbe, VolumeUsage};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn write_aged(dir: &Path, name: &str, len: usize, age: Duration) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(&vec![0_u8; len]).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
    path
}

fn sweeper(dir: &Path, registry: Arc<ActiveArtifactRegistry>) -> RetentionSweeper {
    let cfg = RetentionConfig {
        output_dir: dir.to_path_buf(),
        ..RetentionConfig::default()
    };
    let probe = FixedProbe(VolumeUsage {
        total_bytes: 1000,
        used_bytes: 100,
    });
    RetentionSweeper::new(&cfg, registry, Arc::new(probe))
}

#[test]
fn test_old_unreferenced_file_deleted_registered_one_kept() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ActiveArtifactRegistry::new());
    let stale = write_aged(dir.path(), "stale.mp4", 10, Duration::from_secs(30 * 3600));
    let live = write_aged(dir.path(), "live.mp4", 20, Duration::from_secs(30 * 3600));
    let fresh = write_aged(dir.path(), "fresh.mp4", 30, Duration::from_secs(60));
    registry.register(JobId::new(), &live);

    let report = sweeper(dir.path(), Arc::clone(&registry)).sweep(false).unwrap();
    assert_eq!(report.files_deleted, 1);
    assert_eq!(report.bytes_reclaimed, 10);
    assert_eq!(report.files_preserved, 2);
    assert!(!stale.exists());
    assert!(live.exists());
    assert!(fresh.exists());
}

#[test]
fn test_unregistered_file_becomes_eligible() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ActiveArtifactRegistry::new());
    let job = JobId::new();
    let path = write_aged(dir.path(), "out.mp4", 5, Duration::from_secs(48 * 3600));
    registry.register(job, &path);

    let sweeper = sweeper(dir.path(), Arc::clone(&registry));
    assert_eq!(sweeper.sweep(false).unwrap().files_deleted, 0);

    registry.on_job_evicted(&job);
    assert_eq!(registry.job_count(), 0);
    assert_eq!(sweeper.sweep(false).unwrap().files_deleted, 1);
    assert!(!path.exists());
}

#[test]
fn test_sweep_is_not_recursive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let nested = write_aged(&dir.path().join("sub"), "old.mp4", 5, Duration::from_secs(48 * 3600));

    let report = sweeper(dir.path(), Arc::new(ActiveArtifactRegistry::new()))
        .sweep(false)
        .unwrap();
    assert_eq!(report.files_deleted, 0);
    assert!(nested.exists());
}
