use thiserror::Error;

/// Result type for volume attachment.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring a volume.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store failed.
    #[error("volume backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The acquire was cancelled while waiting for the lease.
    #[error("acquire of {0} cancelled")]
    Cancelled(String),

    /// Volume sizes must be positive.
    #[error("volume {0} has zero size")]
    InvalidSize(String),

    /// The lease never became free within the configured attempts.
    #[error("volume {volume} still locked after {attempts} attempts")]
    RetriesExhausted {
        /// The contended volume.
        volume: String,
        /// Number of mount attempts made.
        attempts: u32,
    },

    /// The volume is leased by someone else.
    #[error(
        "volume {volume} is locked by {}",
        .holder.as_deref().unwrap_or("another instance")
    )]
    VolumeLocked {
        /// The contended volume.
        volume: String,
        /// Current holder, if known.
        holder: Option<String>,
    },
}

impl Error {
    pub(crate) fn backend<E: crate::VolumeBackendError>(error: E) -> Self {
        Self::Backend(Box::new(error))
    }
}
