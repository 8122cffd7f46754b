use thiserror::Error;

use crate::store::StoreError;

/// Result type for the status log.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A stored record could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A record could not be encoded.
    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError for Error {}
