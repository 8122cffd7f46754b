//! Lifecycle of one fleet node: attach the volumes, run the engine on them,
//! and on stop shut the engine down before letting the volumes go.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod node;

pub use error::{Error, Result};
pub use node::{
    DATA_DIR, DEFAULT_STOP_GRACE, DRAIN_WAIT, KILL_WAIT, LOG_DIR, LOG_FILE, Node, NodeOptions,
    NodeState,
};
