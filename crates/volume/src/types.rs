use std::path::PathBuf;
use std::time::Duration;

/// Default pause between mount attempts while a volume is leased elsewhere.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// A durable block volume held in a backing store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VolumeHandle {
    /// Container (bucket) the volume object lives in.
    pub container_id: String,

    /// Name of the volume object within the container.
    pub object_id: String,

    /// Requested capacity in megabytes.
    pub size_mb: u64,
}

impl VolumeHandle {
    /// Creates a new volume handle.
    pub fn new(
        container_id: impl Into<String>,
        object_id: impl Into<String>,
        size_mb: u64,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            object_id: object_id.into(),
            size_mb,
        }
    }
}

impl std::fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container_id, self.object_id)
    }
}

/// A volume mounted exclusively at a local path.
///
/// Valid until released or until the holding process exits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountResult {
    /// Where the volume's contents are visible locally.
    pub local_path: PathBuf,

    /// The mounted volume.
    pub volume: VolumeHandle,
}

/// How `acquire` reacts to a volume leased by someone else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// One attempt; contention is an error.
    FailFast,

    /// Sleep and retry until the lease is free.
    RetryUntilAcquired,
}

/// Pacing for `WaitMode::RetryUntilAcquired`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub interval: Duration,

    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Local cache the backing store stages volume blocks in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache directory.
    pub path: PathBuf,

    /// Cache capacity in megabytes.
    pub size_mb: u64,
}

/// Options passed through to the backend on every mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MountOptions {
    /// Share of the local cache reserved for this volume.
    pub cache_size_mb: u64,
}

/// Result of an idempotent container create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerCreateOutcome {
    /// The container was created by this call.
    Created,

    /// The container was already present.
    AlreadyExists,
}

/// Result of an idempotent volume create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeCreateOutcome {
    /// The volume was created at the requested size.
    Created,

    /// The volume was already present; carries its actual size.
    AlreadyExists {
        /// Size recorded by the backing store.
        size_mb: u64,
    },
}

/// Result of a single mount attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountOutcome {
    /// Lease taken; contents visible at the path.
    Mounted(PathBuf),

    /// Someone else holds the lease.
    Locked {
        /// Identity of the current holder, when the store knows it.
        holder: Option<String>,
    },
}
