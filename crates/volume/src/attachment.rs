use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::VolumeBackend;
use crate::error::{Error, Result};
use crate::types::{
    CacheConfig, ContainerCreateOutcome, MountOptions, MountOutcome, MountResult, RetryPolicy,
    VolumeCreateOutcome, VolumeHandle, WaitMode,
};

/// Options for configuring a `VolumeAttachment`.
pub struct VolumeAttachmentOptions<B> {
    /// The backing store.
    pub backend: B,

    /// Local cache to initialize before the first mount.
    pub cache: CacheConfig,

    /// Cache share requested for each mounted volume.
    pub mount_cache_size_mb: u64,

    /// Pacing of `WaitMode::RetryUntilAcquired`.
    pub retry_policy: RetryPolicy,
}

/// Acquires and releases exclusive mounts of durable volumes.
pub struct VolumeAttachment<B>
where
    B: VolumeBackend,
{
    backend: B,
    cache: CacheConfig,
    cache_initialized: OnceCell<()>,
    mount_options: MountOptions,
    retry_policy: RetryPolicy,
}

impl<B> VolumeAttachment<B>
where
    B: VolumeBackend,
{
    /// Creates a new instance of `VolumeAttachment`.
    pub fn new(
        VolumeAttachmentOptions {
            backend,
            cache,
            mount_cache_size_mb,
            retry_policy,
        }: VolumeAttachmentOptions<B>,
    ) -> Self {
        Self {
            backend,
            cache,
            cache_initialized: OnceCell::new(),
            mount_options: MountOptions {
                cache_size_mb: mount_cache_size_mb,
            },
            retry_policy,
        }
    }

    /// The backing store.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Ensures the volume exists and mounts it exclusively.
    ///
    /// Under `WaitMode::RetryUntilAcquired` lease contention is retried at the
    /// policy's interval until the lease frees up, `max_attempts` is reached
    /// or `cancel` fires. Any other backend failure ends the acquire.
    ///
    /// # Errors
    ///
    /// Returns `VolumeLocked` on contention in `FailFast` mode, `Cancelled`
    /// or `RetriesExhausted` while retrying, and `Backend` for store failures.
    pub async fn acquire(
        &self,
        volume: &VolumeHandle,
        wait_mode: WaitMode,
        cancel: &CancellationToken,
    ) -> Result<MountResult> {
        if volume.size_mb == 0 {
            return Err(Error::InvalidSize(volume.to_string()));
        }

        self.ensure_cache().await?;
        self.ensure_volume(volume).await;

        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(volume.to_string()));
            }

            attempts += 1;
            let holder = match self
                .backend
                .mount(volume, &self.mount_options)
                .await
                .map_err(Error::backend)?
            {
                MountOutcome::Mounted(local_path) => {
                    info!(%volume, path = %local_path.display(), attempts, "volume mounted");

                    return Ok(MountResult {
                        local_path,
                        volume: volume.clone(),
                    });
                }
                MountOutcome::Locked { holder } => holder,
            };

            if wait_mode == WaitMode::FailFast {
                return Err(Error::VolumeLocked {
                    volume: volume.to_string(),
                    holder,
                });
            }

            if self
                .retry_policy
                .max_attempts
                .is_some_and(|max| attempts >= max)
            {
                return Err(Error::RetriesExhausted {
                    volume: volume.to_string(),
                    attempts,
                });
            }

            info!(
                %volume,
                holder = holder.as_deref().unwrap_or("unknown"),
                attempts,
                "volume is locked, retrying in {:?}",
                self.retry_policy.interval
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled(volume.to_string()));
                }
                () = tokio::time::sleep(self.retry_policy.interval) => {}
            }
        }
    }

    /// Unmounts a previously acquired volume. Failures are logged only.
    pub async fn release(&self, mount: &MountResult) {
        match self.backend.unmount(&mount.volume).await {
            Ok(()) => info!(volume = %mount.volume, "volume released"),
            Err(e) => warn!(volume = %mount.volume, "failed to release volume: {}", e),
        }
    }

    async fn ensure_cache(&self) -> Result<()> {
        self.cache_initialized
            .get_or_try_init(|| async {
                debug!(
                    path = %self.cache.path.display(),
                    size_mb = self.cache.size_mb,
                    "initializing volume cache"
                );
                self.backend
                    .initialize_cache(&self.cache)
                    .await
                    .map_err(Error::backend)
            })
            .await?;

        Ok(())
    }

    // Create failures are not fatal here; a volume that really is missing
    // fails at mount time instead.
    async fn ensure_volume(&self, volume: &VolumeHandle) {
        match self
            .backend
            .create_container_if_absent(&volume.container_id)
            .await
        {
            Ok(ContainerCreateOutcome::Created) => {
                info!(container = %volume.container_id, "created container");
            }
            Ok(ContainerCreateOutcome::AlreadyExists) => {
                debug!(container = %volume.container_id, "container already exists");
            }
            Err(e) => {
                warn!(container = %volume.container_id, "failed to create container: {}", e);
            }
        }

        match self.backend.create_volume_if_absent(volume).await {
            Ok(VolumeCreateOutcome::Created) => {
                info!(%volume, size_mb = volume.size_mb, "created volume");
            }
            Ok(VolumeCreateOutcome::AlreadyExists { size_mb }) if size_mb != volume.size_mb => {
                warn!(
                    %volume,
                    requested_mb = volume.size_mb,
                    existing_mb = size_mb,
                    "volume already exists with a different size, keeping existing volume"
                );
            }
            Ok(VolumeCreateOutcome::AlreadyExists { .. }) => {
                debug!(%volume, "volume already exists");
            }
            Err(e) => {
                warn!(%volume, "failed to create volume: {}", e);
            }
        }
    }
}
