use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::types::{
    CacheConfig, ContainerCreateOutcome, MountOptions, MountOutcome, VolumeCreateOutcome,
    VolumeHandle,
};

/// Marker trait for `VolumeBackend` errors.
pub trait VolumeBackendError: Debug + Error + Send + Sync + 'static {}

/// A store of durable volumes that grants exclusive mount leases.
///
/// Expected conditions (already exists, leased elsewhere) come back as
/// outcomes; `Err` is reserved for real failures.
#[async_trait]
pub trait VolumeBackend: Send + Sync + 'static {
    /// The error type for backend operations.
    type Error: VolumeBackendError;

    /// Prepares the local cache. Must run once before the first mount.
    async fn initialize_cache(&self, cache: &CacheConfig) -> Result<(), Self::Error>;

    /// Creates the container unless it already exists.
    async fn create_container_if_absent(
        &self,
        container_id: &str,
    ) -> Result<ContainerCreateOutcome, Self::Error>;

    /// Creates the volume object at `volume.size_mb` unless it already exists.
    async fn create_volume_if_absent(
        &self,
        volume: &VolumeHandle,
    ) -> Result<VolumeCreateOutcome, Self::Error>;

    /// Attempts to take the volume's lease and mount it locally.
    async fn mount(
        &self,
        volume: &VolumeHandle,
        options: &MountOptions,
    ) -> Result<MountOutcome, Self::Error>;

    /// Unmounts the volume and gives up its lease.
    async fn unmount(&self, volume: &VolumeHandle) -> Result<(), Self::Error>;
}
