//! Records where and when each node's engine came up, newest first.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod fs;
mod log;
mod memory;
mod record;
mod store;

pub use error::{Error, Result};
pub use fs::FsStore;
pub use log::{NodeStatusLog, NodeStatusLogOptions};
pub use memory::MemoryStore;
pub use record::{NodeStatusRecord, parse_instance_index};
pub use store::{Store, StoreError};
