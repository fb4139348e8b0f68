//! Infrastructure adapters: in-memory dispatch queue, artifact registry and
//! volume usage probes.

pub mod artifacts;
pub mod queue;
pub mod volume;

pub use artifacts::ActiveArtifactRegistry;
pub use queue::{DispatchQueue, PriorityDispatchQueue};
pub use volume::{FixedProbe, StatvfsProbe, VolumeProbe, VolumeUsage};
