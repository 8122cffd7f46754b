//! Launches the database engine as a child process, watches it for exit and
//! stops it through its control channel.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod handle;
mod mongod;
mod supervisor;

pub use error::{Error, Result};
pub use handle::{EngineProcessHandle, EngineState, ExitStatus};
pub use mongod::{MongodSupervisor, MongodSupervisorOptions, command_line};
pub use supervisor::{LaunchSpec, ProcessSupervisor};
