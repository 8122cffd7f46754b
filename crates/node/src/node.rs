use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleetnode_bootable::Bootable;
use fleetnode_status::{NodeStatusLog, NodeStatusRecord, Store, parse_instance_index};
use fleetnode_supervisor::{EngineProcessHandle, LaunchSpec, ProcessSupervisor};
use fleetnode_volume::{MountResult, VolumeAttachment, VolumeBackend, VolumeHandle, WaitMode};
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// How long `stop` waits for the engine after the shutdown command.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(15);

/// How long `stop` waits for the engine to die after a kill.
pub const KILL_WAIT: Duration = Duration::from_secs(5);

/// How long `stop` waits for the engine's remaining output once it exited.
pub const DRAIN_WAIT: Duration = Duration::from_secs(5);

/// Engine data directory, relative to the data volume.
pub const DATA_DIR: &str = "data";

/// Engine log directory, relative to the log volume.
pub const LOG_DIR: &str = "log";

/// Engine log file name.
pub const LOG_FILE: &str = "mongod.log";

/// Lifecycle of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Constructed, not started.
    Idle,

    /// Acquiring volumes.
    Attaching,

    /// Starting the engine.
    Launching,

    /// Engine launched.
    Running,

    /// Stopping the engine.
    Stopping,

    /// Volumes released.
    Released,

    /// Terminal.
    Stopped,
}

/// Options for configuring a `Node`.
pub struct NodeOptions<B, P, S>
where
    B: VolumeBackend,
    P: ProcessSupervisor,
    S: Store,
{
    /// Host other fleet members reach this node's engine on.
    pub advertised_host: String,

    /// Volume attachment for the data and log volumes.
    pub attachment: VolumeAttachment<B>,

    /// Volume holding the engine's data files.
    pub data_volume: VolumeHandle,

    /// Identifier of this instance, e.g. `MongoWorkerRole_IN_0`.
    pub instance_id: String,

    /// Separate volume for engine logs. Logs go on the data volume when unset.
    pub log_volume: Option<VolumeHandle>,

    /// Port the engine listens on.
    pub port: u16,

    /// Where start records are appended.
    pub status_log: NodeStatusLog<S>,

    /// How long `stop` waits for a graceful exit before killing the engine.
    pub stop_grace: Duration,

    /// Engine process supervisor.
    pub supervisor: P,
}

#[derive(Default)]
struct Resources {
    data_mount: Option<MountResult>,
    engine: Option<EngineProcessHandle>,
    log_mount: Option<MountResult>,
}

/// A single fleet node: one engine on one exclusively held volume.
///
/// `start` and `stop` may be called from different tasks. A `stop` issued
/// while `start` is still waiting for the data volume's lease aborts the
/// wait.
pub struct Node<B, P, S>
where
    B: VolumeBackend,
    P: ProcessSupervisor,
    S: Store,
{
    advertised_host: String,
    attachment: VolumeAttachment<B>,
    data_volume: VolumeHandle,
    instance_id: String,
    lifecycle: Mutex<()>,
    log_volume: Option<VolumeHandle>,
    port: u16,
    resources: Mutex<Resources>,
    shutdown_token: CancellationToken,
    state: watch::Sender<NodeState>,
    status_log: NodeStatusLog<S>,
    stop_grace: Duration,
    supervisor: P,
}

impl<B, P, S> Node<B, P, S>
where
    B: VolumeBackend,
    P: ProcessSupervisor,
    S: Store,
{
    /// Creates a new instance of `Node`.
    pub fn new(
        NodeOptions {
            advertised_host,
            attachment,
            data_volume,
            instance_id,
            log_volume,
            port,
            status_log,
            stop_grace,
            supervisor,
        }: NodeOptions<B, P, S>,
    ) -> Self {
        let (state, _) = watch::channel(NodeState::Idle);

        Self {
            advertised_host,
            attachment,
            data_volume,
            instance_id,
            lifecycle: Mutex::new(()),
            log_volume,
            port,
            resources: Mutex::new(Resources::default()),
            shutdown_token: CancellationToken::new(),
            state,
            status_log,
            stop_grace,
            supervisor,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    /// Receiver observing every state change.
    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// The engine's admin address on this host.
    pub const fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port)
    }

    /// The running engine, if launched.
    pub async fn engine(&self) -> Option<EngineProcessHandle> {
        self.resources.lock().await.engine.clone()
    }

    /// Where the data volume is mounted, if attached.
    pub async fn data_mount(&self) -> Option<MountResult> {
        self.resources.lock().await.data_mount.clone()
    }

    /// The volume attachment, for inspecting the backend.
    pub const fn attachment(&self) -> &VolumeAttachment<B> {
        &self.attachment
    }

    fn set_state(&self, state: NodeState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(
                instance_id = %self.instance_id,
                "node state {:?} -> {:?}", previous, state
            );
        }
    }

    /// Attaches volumes, prepares directories and launches the engine.
    ///
    /// On failure every volume acquired so far is released and the node
    /// ends in `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns an error if a volume cannot be attached, a directory cannot
    /// be created or the engine cannot be launched.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let state = self.state();
        if state != NodeState::Idle {
            return Err(Error::AlreadyStarted(state));
        }

        match self.start_steps().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(instance_id = %self.instance_id, "failed to start node: {}", e);
                self.unwind().await;
                self.set_state(NodeState::Stopped);

                Err(e)
            }
        }
    }

    async fn start_steps(&self) -> Result<()> {
        self.set_state(NodeState::Attaching);

        let data_mount = self
            .attachment
            .acquire(
                &self.data_volume,
                WaitMode::RetryUntilAcquired,
                &self.shutdown_token,
            )
            .await
            .map_err(|source| Error::Volume {
                role: "data",
                source,
            })?;
        let data_root = data_mount.local_path.clone();
        self.resources.lock().await.data_mount = Some(data_mount);

        let data_path = data_root.join(DATA_DIR);
        create_dir(&data_path, "failed to create data directory").await?;

        let log_root = match &self.log_volume {
            Some(log_volume) => {
                let log_mount = self
                    .attachment
                    .acquire(log_volume, WaitMode::FailFast, &self.shutdown_token)
                    .await
                    .map_err(|source| Error::Volume { role: "log", source })?;
                let log_root = log_mount.local_path.clone();
                self.resources.lock().await.log_mount = Some(log_mount);

                log_root
            }
            None => {
                info!("no log volume configured, logging to the data volume");
                data_root
            }
        };

        let log_dir = log_root.join(LOG_DIR);
        create_dir(&log_dir, "failed to create log directory").await?;

        self.set_state(NodeState::Launching);

        let spec = LaunchSpec {
            data_path,
            log_path: log_dir.join(LOG_FILE),
            port: self.port,
        };
        let engine = self.supervisor.launch(&spec).await.map_err(Error::Launch)?;
        self.resources.lock().await.engine = Some(engine);

        self.set_state(NodeState::Running);

        self.record_start().await;

        Ok(())
    }

    async fn record_start(&self) {
        let record = NodeStatusRecord {
            instance_name: self.instance_id.clone(),
            instance_index: parse_instance_index(&self.instance_id),
            host: self.advertised_host.clone(),
            port: self.port,
            start_time: Utc::now(),
        };

        if let Err(e) = self.status_log.append(&record).await {
            warn!("failed to record node start: {}", e);
        }
    }

    // Releases whatever a failed start acquired, in reverse order.
    async fn unwind(&self) {
        let (log_mount, data_mount) = {
            let mut resources = self.resources.lock().await;
            (resources.log_mount.take(), resources.data_mount.take())
        };

        if let Some(log_mount) = log_mount {
            self.attachment.release(&log_mount).await;
        }

        if let Some(data_mount) = data_mount {
            self.attachment.release(&data_mount).await;
        }
    }

    /// Stops the engine and releases both volumes.
    ///
    /// Every step runs regardless of the ones before it failing: shutdown
    /// command, bounded wait for exit, kill if still running, bounded drain
    /// of the engine's output, release of the data volume, release of the
    /// log volume. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        // abort a start still waiting for a lease before queueing behind it
        self.shutdown_token.cancel();

        let _lifecycle = self.lifecycle.lock().await;

        match self.state() {
            NodeState::Stopped => return,
            NodeState::Idle => {
                self.set_state(NodeState::Stopped);
                return;
            }
            _ => {}
        }

        self.set_state(NodeState::Stopping);

        let (engine, data_mount, log_mount) = {
            let mut resources = self.resources.lock().await;
            (
                resources.engine.take(),
                resources.data_mount.take(),
                resources.log_mount.take(),
            )
        };

        if let Some(engine) = engine {
            self.stop_engine(&engine).await;

            if timeout(DRAIN_WAIT, self.supervisor.wait_for_tasks())
                .await
                .is_err()
            {
                warn!(pid = engine.pid(), "engine output still open after exit");
            }
        }

        if let Some(data_mount) = data_mount {
            self.attachment.release(&data_mount).await;
        }

        if let Some(log_mount) = log_mount {
            self.attachment.release(&log_mount).await;
        }

        self.set_state(NodeState::Released);
        self.set_state(NodeState::Stopped);
    }

    async fn stop_engine(&self, engine: &EngineProcessHandle) {
        self.supervisor.shutdown(engine, self.admin_addr()).await;

        match timeout(self.stop_grace, self.supervisor.wait_for_exit(engine)).await {
            Ok(status) => {
                info!(pid = engine.pid(), "engine stopped with {}", status);
                return;
            }
            Err(_) => {
                warn!(
                    pid = engine.pid(),
                    "engine still running after {:?}, killing", self.stop_grace
                );
            }
        }

        if let Err(e) = self.supervisor.kill(engine).await {
            error!("failed to kill engine: {}", e);
        }

        if timeout(KILL_WAIT, self.supervisor.wait_for_exit(engine))
            .await
            .is_err()
        {
            error!(pid = engine.pid(), "engine did not exit after kill");
        }
    }

    /// Waits until the engine exits, or, if it never launched, until the
    /// node is stopped.
    pub async fn wait(&self) {
        if let Some(engine) = self.engine().await {
            let status = self.supervisor.wait_for_exit(&engine).await;
            info!(pid = engine.pid(), "engine exited with {}", status);
            return;
        }

        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == NodeState::Stopped).await;
    }
}

async fn create_dir(path: &Path, context: &'static str) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::Io(context, e))
}

#[async_trait]
impl<B, P, S> Bootable for Node<B, P, S>
where
    B: VolumeBackend,
    P: ProcessSupervisor,
    S: Store,
{
    type Error = Error;

    fn name(&self) -> &str {
        &self.instance_id
    }

    async fn start(&self) -> Result<()> {
        Self::start(self).await
    }

    async fn shutdown(&self) {
        self.stop().await;
    }

    async fn wait(&self) {
        Self::wait(self).await;
    }
}
