//! Volume backend on a local or shared filesystem.
//!
//! Containers are directories under a root, volumes are directories holding a
//! `volume.json` descriptor, a `lease` file and the volume's `contents`.
//! Leases are advisory exclusive locks on the `lease` file, so backends in
//! different processes (or in one process) sharing the root contend for a
//! volume the same way nodes contend for a network volume.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fleetnode_volume::{
    CacheConfig, ContainerCreateOutcome, MountOptions, MountOutcome, VolumeBackend,
    VolumeCreateOutcome, VolumeHandle,
};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const CONTENTS_DIR: &str = "contents";
const DESCRIPTOR_FILE: &str = "volume.json";
const LEASE_FILE: &str = "lease";

enum Lease {
    Taken(File),
    Held(Option<String>),
}

#[derive(Debug, Deserialize, Serialize)]
struct VolumeDescriptor {
    size_mb: u64,
}

/// Options for configuring a `FsVolumeBackend`.
pub struct FsVolumeBackendOptions {
    /// Identity written into lease files this backend holds.
    pub holder: String,

    /// Directory containing all containers.
    pub root: PathBuf,
}

/// Filesystem volume backend.
#[derive(Debug)]
pub struct FsVolumeBackend {
    holder: String,
    leases: Mutex<HashMap<(String, String), File>>,
    root: PathBuf,
}

impl FsVolumeBackend {
    /// Creates a new instance of `FsVolumeBackend`.
    #[must_use]
    pub fn new(FsVolumeBackendOptions { holder, root }: FsVolumeBackendOptions) -> Self {
        Self {
            holder,
            leases: Mutex::new(HashMap::new()),
            root,
        }
    }

    fn volume_dir(&self, volume: &VolumeHandle) -> PathBuf {
        self.root
            .join(&volume.container_id)
            .join(&volume.object_id)
    }
}

/// Takes the advisory lock on `lease_path` and records `holder` in it.
///
/// Blocking; run it off the async workers.
fn try_lease(lease_path: &Path, holder: &str) -> Result<Lease, Error> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lease_path)
        .map_err(|e| Error::Io("failed to open lease file", e))?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            file.set_len(0)
                .map_err(|e| Error::Io("failed to truncate lease file", e))?;
            writeln!(file, "{holder}").map_err(|e| Error::Io("failed to write lease file", e))?;

            Ok(Lease::Taken(file))
        }
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            let holder = std::fs::read_to_string(lease_path)
                .ok()
                .map(|contents| contents.trim().to_string())
                .filter(|holder| !holder.is_empty());

            Ok(Lease::Held(holder))
        }
        Err(e) => Err(Error::Io("failed to lock lease file", e)),
    }
}

/// Clears the holder from a lease file and drops the lock. Blocking.
fn give_up_lease(file: &File) -> Result<(), Error> {
    file.set_len(0)
        .map_err(|e| Error::Io("failed to clear lease file", e))?;
    FileExt::unlock(file).map_err(|e| Error::Io("failed to unlock lease file", e))
}

async fn existing_volume(dir: &Path) -> Result<VolumeCreateOutcome, Error> {
    let bytes = fs::read(dir.join(DESCRIPTOR_FILE))
        .await
        .map_err(|e| Error::Io("failed to read volume descriptor", e))?;
    let descriptor: VolumeDescriptor = serde_json::from_slice(&bytes)?;

    Ok(VolumeCreateOutcome::AlreadyExists {
        size_mb: descriptor.size_mb,
    })
}

async fn stage_volume(staging: &Path, size_mb: u64) -> Result<(), Error> {
    fs::create_dir(staging)
        .await
        .map_err(|e| Error::Io("failed to create volume staging directory", e))?;
    fs::create_dir(staging.join(CONTENTS_DIR))
        .await
        .map_err(|e| Error::Io("failed to create volume contents directory", e))?;

    let descriptor = serde_json::to_vec_pretty(&VolumeDescriptor { size_mb })?;
    fs::write(staging.join(DESCRIPTOR_FILE), descriptor)
        .await
        .map_err(|e| Error::Io("failed to write volume descriptor", e))
}

async fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging).await {
        warn!(path = %staging.display(), "failed to remove volume staging directory: {}", e);
    }
}

fn key(volume: &VolumeHandle) -> (String, String) {
    (volume.container_id.clone(), volume.object_id.clone())
}

#[async_trait]
impl VolumeBackend for FsVolumeBackend {
    type Error = Error;

    async fn initialize_cache(&self, cache: &CacheConfig) -> Result<(), Self::Error> {
        fs::create_dir_all(&cache.path)
            .await
            .map_err(|e| Error::Io("failed to create cache directory", e))
    }

    async fn create_container_if_absent(
        &self,
        container_id: &str,
    ) -> Result<ContainerCreateOutcome, Self::Error> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Io("failed to create volume root", e))?;

        match fs::create_dir(self.root.join(container_id)).await {
            Ok(()) => Ok(ContainerCreateOutcome::Created),
            Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Ok(ContainerCreateOutcome::AlreadyExists)
            }
            Err(e) => Err(Error::Io("failed to create container directory", e)),
        }
    }

    async fn create_volume_if_absent(
        &self,
        volume: &VolumeHandle,
    ) -> Result<VolumeCreateOutcome, Self::Error> {
        if !fs::try_exists(self.root.join(&volume.container_id))
            .await
            .map_err(|e| Error::Io("failed to check container directory", e))?
        {
            return Err(Error::NoSuchContainer(volume.container_id.clone()));
        }

        let dir = self.volume_dir(volume);

        if fs::try_exists(&dir)
            .await
            .map_err(|e| Error::Io("failed to check volume directory", e))?
        {
            return existing_volume(&dir).await;
        }

        // the volume only becomes visible, descriptor included, on rename
        let staging = self.root.join(&volume.container_id).join(format!(
            ".{}.tmp-{}",
            volume.object_id,
            Uuid::new_v4()
        ));

        if let Err(e) = stage_volume(&staging, volume.size_mb).await {
            remove_staging(&staging).await;
            return Err(e);
        }

        match fs::rename(&staging, &dir).await {
            Ok(()) => Ok(VolumeCreateOutcome::Created),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                debug!(%volume, "volume created concurrently");
                remove_staging(&staging).await;
                existing_volume(&dir).await
            }
            Err(e) => {
                remove_staging(&staging).await;
                Err(Error::Io("failed to move volume into place", e))
            }
        }
    }

    async fn mount(
        &self,
        volume: &VolumeHandle,
        options: &MountOptions,
    ) -> Result<MountOutcome, Self::Error> {
        let dir = self.volume_dir(volume);
        let contents = dir.join(CONTENTS_DIR);

        if !fs::try_exists(dir.join(DESCRIPTOR_FILE))
            .await
            .map_err(|e| Error::Io("failed to check volume descriptor", e))?
        {
            return Err(Error::NoSuchVolume(volume.to_string()));
        }

        if self.leases.lock().contains_key(&key(volume)) {
            return Ok(MountOutcome::Mounted(contents));
        }

        let lease_path = dir.join(LEASE_FILE);
        let holder = self.holder.clone();
        let lease =
            tokio::task::spawn_blocking(move || try_lease(&lease_path, &holder)).await??;

        match lease {
            Lease::Taken(file) => {
                self.leases.lock().insert(key(volume), file);
                debug!(
                    %volume,
                    path = %contents.display(),
                    cache_size_mb = options.cache_size_mb,
                    "took volume lease"
                );

                Ok(MountOutcome::Mounted(contents))
            }
            // a concurrent mount through this backend won the lock
            Lease::Held(_) if self.leases.lock().contains_key(&key(volume)) => {
                Ok(MountOutcome::Mounted(contents))
            }
            Lease::Held(holder) => Ok(MountOutcome::Locked { holder }),
        }
    }

    async fn unmount(&self, volume: &VolumeHandle) -> Result<(), Self::Error> {
        let file = self
            .leases
            .lock()
            .remove(&key(volume))
            .ok_or_else(|| Error::NotMounted(volume.to_string()))?;

        tokio::task::spawn_blocking(move || give_up_lease(&file)).await??;

        debug!(%volume, "gave up volume lease");

        Ok(())
    }
}
