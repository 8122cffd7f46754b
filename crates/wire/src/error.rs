use std::io;

use thiserror::Error;

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the engine's control channel.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine answered a command with `ok: 0`.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The peer closed the connection before replying.
    #[error("connection closed before a reply was received")]
    ConnectionClosed,

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] io::Error),

    /// A BSON document could not be decoded.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A message could not be framed.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The declared message length exceeds the configured maximum.
    #[error("message of {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge {
        /// Declared size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// The operation did not complete in time.
    #[error("timed out: {0}")]
    Timeout(&'static str),

    /// The peer sent an opcode this codec does not speak.
    #[error("unsupported opcode: {0}")]
    UnsupportedOpCode(i32),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::Io("codec io error", error)
    }
}
