//! Age and pressure based retention sweeps over the output directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::core::EngineError;
use crate::infra::{ActiveArtifactRegistry, VolumeProbe};

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Files deleted (or that would be, in a dry run).
    pub files_deleted: u64,
    /// Bytes freed (or that would be, in a dry run).
    pub bytes_reclaimed: u64,
    /// Files kept because they are recent or owned by a live job.
    pub files_preserved: u64,
}

/// Deletes aged output files that no live job references.
pub struct RetentionSweeper {
    output_dir: PathBuf,
    retention_age: Duration,
    threshold_percent: f64,
    registry: Arc<ActiveArtifactRegistry>,
    probe: Arc<dyn VolumeProbe>,
}

impl RetentionSweeper {
    /// Create a sweeper over `config.output_dir`.
    #[must_use]
    pub fn new(
        config: &RetentionConfig,
        registry: Arc<ActiveArtifactRegistry>,
        probe: Arc<dyn VolumeProbe>,
    ) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            retention_age: config.retention_age(),
            threshold_percent: config.cleanup_threshold_percent,
            registry,
            probe,
        }
    }

    /// Directory being swept.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether disk usage of the output volume is at or above the threshold.
    ///
    /// An unreadable volume never triggers a sweep.
    #[must_use]
    pub fn should_cleanup(&self) -> bool {
        match self.probe.usage(&self.output_dir) {
            Ok(usage) => usage
                .used_percent()
                .is_some_and(|pct| pct >= self.threshold_percent),
            Err(e) => {
                debug!(dir = %self.output_dir.display(), error = %e, "volume usage unavailable");
                false
            }
        }
    }

    /// Run one pass. With `dry_run`, nothing is deleted but the report is
    /// identical to what a real pass would produce.
    pub fn sweep(&self, dry_run: bool) -> Result<SweepReport, EngineError> {
        self.sweep_at(dry_run, SystemTime::now())
    }

    /// [`sweep`](Self::sweep) against an explicit clock reading.
    pub fn sweep_at(&self, dry_run: bool, now: SystemTime) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.output_dir.display(), "output directory missing, nothing to sweep");
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "unreadable directory entry skipped");
                    continue;
                }
            };
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let path = entry.path();
            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .unwrap_or(Duration::ZERO);
            if age < self.retention_age || self.registry.is_active(&path) {
                report.files_preserved += 1;
                continue;
            }

            if !dry_run {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to delete aged file");
                    report.files_preserved += 1;
                    continue;
                }
            }
            debug!(path = %path.display(), dry_run, age_secs = age.as_secs(), "aged file reclaimed");
            report.files_deleted += 1;
            report.bytes_reclaimed += metadata.len();
        }

        info!(
            dir = %self.output_dir.display(),
            dry_run,
            files_deleted = report.files_deleted,
            bytes_reclaimed = report.bytes_reclaimed,
            files_preserved = report.files_preserved,
            "retention sweep finished"
        );
        Ok(report)
    }
}
