//! Registry of files owned by live jobs.
//!
//! A path registered under any job is protected from retention sweeps until
//! the job is evicted from the ledger.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::core::{EvictionListener, JobId};

/// Map of job id to the absolute paths it produced.
#[derive(Default)]
pub struct ActiveArtifactRegistry {
    entries: RwLock<HashMap<JobId, HashSet<PathBuf>>>,
}

/// Absolute form of `path` without touching the filesystem.
fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl ActiveArtifactRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Protect `path` on behalf of `job_id`.
    pub fn register(&self, job_id: JobId, path: impl AsRef<Path>) {
        let path = absolutize(path.as_ref());
        debug!(job_id = %job_id, path = %path.display(), "artifact registered");
        self.entries.write().entry(job_id).or_default().insert(path);
    }

    /// Drop every path held by `job_id`, returning them.
    pub fn unregister_job(&self, job_id: &JobId) -> Vec<PathBuf> {
        let released: Vec<PathBuf> = self
            .entries
            .write()
            .remove(job_id)
            .map(|paths| paths.into_iter().collect())
            .unwrap_or_default();
        if !released.is_empty() {
            debug!(job_id = %job_id, files = released.len(), "artifacts released");
        }
        released
    }

    /// Whether any job holds `path`.
    #[must_use]
    pub fn is_active(&self, path: &Path) -> bool {
        let path = absolutize(path);
        self.entries.read().values().any(|paths| paths.contains(&path))
    }

    /// Paths held by `job_id`.
    #[must_use]
    pub fn paths_for(&self, job_id: &JobId) -> Vec<PathBuf> {
        self.entries
            .read()
            .get(job_id)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every protected path.
    #[must_use]
    pub fn active_paths(&self) -> HashSet<PathBuf> {
        self.entries.read().values().flatten().cloned().collect()
    }

    /// Number of jobs with registered artifacts.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.entries.read().len()
    }
}

impl EvictionListener for ActiveArtifactRegistry {
    fn on_job_evicted(&self, id: &JobId) {
        self.unregister_job(id);
    }
}
