use std::io;

use thiserror::Error;

/// Result type for process supervision.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising the engine process.
#[derive(Debug, Error)]
pub enum Error {
    /// The OS refused to start the engine.
    #[error("failed to launch {executable}: {source}")]
    LaunchFailed {
        /// Executable that was attempted.
        executable: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The process started but reported no pid.
    #[error("launched process has no pid")]
    MissingPid,

    /// A signal could not be delivered.
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        /// Target process.
        pid: u32,
        /// Signal name.
        signal: &'static str,
        /// Underlying errno.
        #[source]
        source: nix::errno::Errno,
    },
}
