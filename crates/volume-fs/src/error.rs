use fleetnode_volume::VolumeBackendError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The container directory does not exist.
    #[error("container {0} not found")]
    NoSuchContainer(String),

    /// The volume directory or its descriptor does not exist.
    #[error("volume {0} not found")]
    NoSuchVolume(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// `unmount` was called on a volume this backend does not hold.
    #[error("volume {0} is not mounted by this backend")]
    NotMounted(String),

    /// A blocking lease operation panicked or was cancelled.
    #[error("lease task failed: {0}")]
    LeaseTask(#[from] tokio::task::JoinError),

    /// The volume descriptor could not be read or written.
    #[error("invalid volume descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl VolumeBackendError for Error {}
