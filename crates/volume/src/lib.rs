//! Exclusive attachment of durable, lease-protected volumes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod attachment;
mod backend;
mod error;
mod types;

pub use attachment::{VolumeAttachment, VolumeAttachmentOptions};
pub use backend::{VolumeBackend, VolumeBackendError};
pub use error::{Error, Result};
pub use types::{
    CacheConfig, ContainerCreateOutcome, DEFAULT_RETRY_INTERVAL, MountOptions, MountOutcome,
    MountResult, RetryPolicy, VolumeCreateOutcome, VolumeHandle, WaitMode,
};
