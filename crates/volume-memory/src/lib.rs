//! In-memory volume backend for local development and tests.
//!
//! Instances created with [`MemoryVolumeBackend::instance`] share one store
//! but hold leases under their own name, so several "nodes" in one process
//! contend for volumes the way separate machines would.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fleetnode_volume::{
    CacheConfig, ContainerCreateOutcome, MountOptions, MountOutcome, VolumeBackend,
    VolumeCreateOutcome, VolumeHandle,
};
use parking_lot::Mutex;
use tracing::debug;

/// Backend operation, used to inject failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `initialize_cache`.
    InitializeCache,
    /// `create_container_if_absent`.
    CreateContainer,
    /// `create_volume_if_absent`.
    CreateVolume,
    /// `mount`.
    Mount,
    /// `unmount`.
    Unmount,
}

/// A call received by one instance, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// Cache initialized at the given path.
    InitializeCache(PathBuf),
    /// Container create for the given container id.
    CreateContainer(String),
    /// Volume create for the given object id.
    CreateVolume(String),
    /// Mount attempt for the given object id.
    Mount(String),
    /// Unmount of the given object id.
    Unmount(String),
}

#[derive(Debug)]
struct StoredVolume {
    size_mb: u64,
    holder: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    caches: HashMap<String, PathBuf>,
    containers: HashSet<String>,
    volumes: HashMap<(String, String), StoredVolume>,
}

#[derive(Debug, Default)]
struct Local {
    calls: Vec<Call>,
    failures: Vec<Operation>,
}

/// In-memory volume backend.
#[derive(Clone, Debug)]
pub struct MemoryVolumeBackend {
    holder: String,
    local: Arc<Mutex<Local>>,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryVolumeBackend {
    /// Creates a new store with one instance named `holder`.
    pub fn new(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            local: Arc::new(Mutex::new(Local::default())),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Another instance on the same store, holding leases as `holder`.
    ///
    /// The new instance starts with an empty call log and no queued failures.
    #[must_use]
    pub fn instance(&self, holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            local: Arc::new(Mutex::new(Local::default())),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Name this instance holds leases under.
    #[must_use]
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Makes the next call of `operation` on this instance fail.
    pub fn fail_next(&self, operation: Operation) {
        self.local.lock().failures.push(operation);
    }

    /// Calls received by this instance so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.local.lock().calls.clone()
    }

    /// Whether this instance currently holds the volume's lease.
    #[must_use]
    pub fn is_held_by_self(&self, volume: &VolumeHandle) -> bool {
        self.shared
            .lock()
            .volumes
            .get(&key(volume))
            .and_then(|stored| stored.holder.as_deref())
            == Some(self.holder.as_str())
    }

    /// Drops whatever lease is held on the volume, as if its holder died.
    pub fn break_lease(&self, volume: &VolumeHandle) {
        if let Some(stored) = self.shared.lock().volumes.get_mut(&key(volume)) {
            stored.holder = None;
        }
    }

    fn record(&self, call: Call, operation: Operation) -> Result<(), Error> {
        let mut local = self.local.lock();
        local.calls.push(call);

        if let Some(index) = local.failures.iter().position(|op| *op == operation) {
            local.failures.remove(index);
            return Err(Error::Injected(operation));
        }

        Ok(())
    }
}

fn key(volume: &VolumeHandle) -> (String, String) {
    (volume.container_id.clone(), volume.object_id.clone())
}

#[async_trait]
impl VolumeBackend for MemoryVolumeBackend {
    type Error = Error;

    async fn initialize_cache(&self, cache: &CacheConfig) -> Result<(), Self::Error> {
        self.record(
            Call::InitializeCache(cache.path.clone()),
            Operation::InitializeCache,
        )?;

        self.shared
            .lock()
            .caches
            .insert(self.holder.clone(), cache.path.clone());

        Ok(())
    }

    async fn create_container_if_absent(
        &self,
        container_id: &str,
    ) -> Result<ContainerCreateOutcome, Self::Error> {
        self.record(
            Call::CreateContainer(container_id.to_string()),
            Operation::CreateContainer,
        )?;

        if self
            .shared
            .lock()
            .containers
            .insert(container_id.to_string())
        {
            Ok(ContainerCreateOutcome::Created)
        } else {
            Ok(ContainerCreateOutcome::AlreadyExists)
        }
    }

    async fn create_volume_if_absent(
        &self,
        volume: &VolumeHandle,
    ) -> Result<VolumeCreateOutcome, Self::Error> {
        self.record(
            Call::CreateVolume(volume.object_id.clone()),
            Operation::CreateVolume,
        )?;

        let mut shared = self.shared.lock();

        if !shared.containers.contains(&volume.container_id) {
            return Err(Error::NoSuchContainer(volume.container_id.clone()));
        }

        if let Some(existing) = shared.volumes.get(&key(volume)) {
            return Ok(VolumeCreateOutcome::AlreadyExists {
                size_mb: existing.size_mb,
            });
        }

        shared.volumes.insert(
            key(volume),
            StoredVolume {
                size_mb: volume.size_mb,
                holder: None,
            },
        );

        Ok(VolumeCreateOutcome::Created)
    }

    async fn mount(
        &self,
        volume: &VolumeHandle,
        options: &MountOptions,
    ) -> Result<MountOutcome, Self::Error> {
        self.record(Call::Mount(volume.object_id.clone()), Operation::Mount)?;

        let mut shared = self.shared.lock();

        let cache_root = shared
            .caches
            .get(&self.holder)
            .cloned()
            .ok_or_else(|| Error::CacheNotInitialized(self.holder.clone()))?;

        let stored = shared
            .volumes
            .get_mut(&key(volume))
            .ok_or_else(|| Error::NoSuchVolume(volume.to_string()))?;

        if let Some(holder) = stored.holder.as_ref().filter(|h| **h != self.holder) {
            return Ok(MountOutcome::Locked {
                holder: Some(holder.clone()),
            });
        }
        stored.holder = Some(self.holder.clone());

        debug!(
            holder = %self.holder,
            %volume,
            cache_size_mb = options.cache_size_mb,
            "mounted in-memory volume"
        );

        Ok(MountOutcome::Mounted(
            cache_root
                .join(&volume.container_id)
                .join(&volume.object_id),
        ))
    }

    async fn unmount(&self, volume: &VolumeHandle) -> Result<(), Self::Error> {
        self.record(Call::Unmount(volume.object_id.clone()), Operation::Unmount)?;

        let mut shared = self.shared.lock();

        match shared.volumes.get_mut(&key(volume)) {
            Some(stored) if stored.holder.as_deref() == Some(self.holder.as_str()) => {
                stored.holder = None;
                Ok(())
            }
            _ => Err(Error::NotMounted(volume.to_string())),
        }
    }
}
