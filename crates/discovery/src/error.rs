use std::io;

use thiserror::Error;

use crate::membership::MembershipError;

/// Result type for discovery.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during endpoint discovery.
#[derive(Debug, Error)]
pub enum Error {
    /// The fleet file is not valid JSON of the expected shape.
    #[error("invalid fleet file: {0}")]
    FleetFile(#[from] serde_json::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] io::Error),

    /// Membership could not be read.
    #[error("failed to read fleet membership: {0}")]
    Membership(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No candidate passed its liveness probe.
    #[error("no live endpoint among {candidates} candidates")]
    NoLiveEndpoint {
        /// Number of candidates probed.
        candidates: usize,
    },

    /// A probe reached the candidate but it is not serving.
    #[error("probe rejected: {0}")]
    ProbeRejected(String),

    /// A candidate address did not resolve.
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        /// Address as given.
        address: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },

    /// Engine wire protocol error during a handshake probe.
    #[error(transparent)]
    Wire(#[from] fleetnode_wire::Error),
}

impl MembershipError for Error {}
