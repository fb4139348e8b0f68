//! Disk usage probes for pressure-triggered retention sweeps.

use std::io;
use std::path::Path;

/// Capacity figures for the volume holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    /// Total bytes on the volume.
    pub total_bytes: u64,
    /// Bytes in use.
    pub used_bytes: u64,
}

impl VolumeUsage {
    /// Percentage of the volume in use, or `None` for an empty volume.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn used_percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some(self.used_bytes as f64 / self.total_bytes as f64 * 100.0)
    }
}

/// Source of volume usage figures.
pub trait VolumeProbe: Send + Sync {
    /// Usage of the volume containing `path`.
    fn usage(&self, path: &Path) -> io::Result<VolumeUsage>;
}

/// Probe backed by `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl VolumeProbe for StatvfsProbe {
    #[allow(clippy::useless_conversion)]
    fn usage(&self, path: &Path) -> io::Result<VolumeUsage> {
        let stat = nix::sys::statvfs::statvfs(path)?;
        let frsize = u64::from(stat.fragment_size());
        let total_bytes = u64::from(stat.blocks()).saturating_mul(frsize);
        let free_bytes = u64::from(stat.blocks_free()).saturating_mul(frsize);
        Ok(VolumeUsage {
            total_bytes,
            used_bytes: total_bytes.saturating_sub(free_bytes),
        })
    }
}

#[cfg(not(unix))]
impl VolumeProbe for StatvfsProbe {
    fn usage(&self, _path: &Path) -> io::Result<VolumeUsage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "volume usage is only available on unix",
        ))
    }
}

/// Probe returning fixed figures; for tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub VolumeUsage);

impl VolumeProbe for FixedProbe {
    fn usage(&self, _path: &Path) -> io::Result<VolumeUsage> {
        Ok(self.0)
    }
}
