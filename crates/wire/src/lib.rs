//! Minimal speaker of the engine's wire protocol: just enough OP_MSG and BSON
//! to issue admin commands such as `shutdown` and `hello`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod bson;
mod client;
pub mod codec;
pub mod commands;
mod error;

pub use bson::{Bson, Document};
pub use client::{AdminClient, DEFAULT_TIMEOUT};
pub use codec::{OpMsg, OpMsgCodec};
pub use error::{Error, Result};
