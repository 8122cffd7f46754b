use thiserror::Error;

use crate::NodeState;

/// Result type for node lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort `start`.
#[derive(Debug, Error)]
pub enum Error {
    /// `start` was called on a node that has already left `Idle`.
    #[error("node already started (state {0:?})")]
    AlreadyStarted(NodeState),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The engine could not be launched.
    #[error("failed to launch engine: {0}")]
    Launch(#[source] fleetnode_supervisor::Error),

    /// A volume could not be attached.
    #[error("failed to attach {role} volume: {source}")]
    Volume {
        /// `data` or `log`.
        role: &'static str,
        /// Attachment error.
        #[source]
        source: fleetnode_volume::Error,
    },
}
