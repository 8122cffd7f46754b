use fleetnode_volume::VolumeBackendError;
use thiserror::Error;

use crate::Operation;

/// Errors produced by the in-memory backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// `mount` was called before `initialize_cache`.
    #[error("cache not initialized for {0}")]
    CacheNotInitialized(String),

    /// A failure queued with `fail_next`.
    #[error("injected failure in {0:?}")]
    Injected(Operation),

    /// The container does not exist.
    #[error("container {0} not found")]
    NoSuchContainer(String),

    /// The volume does not exist.
    #[error("volume {0} not found")]
    NoSuchVolume(String),

    /// `unmount` was called on a volume this instance does not hold.
    #[error("volume {0} is not mounted by this instance")]
    NotMounted(String),
}

impl VolumeBackendError for Error {}
