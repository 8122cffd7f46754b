use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use fleetnode_bootable::Bootable;
use fleetnode_node::{DEFAULT_STOP_GRACE, Error, KILL_WAIT, Node, NodeOptions, NodeState};
use fleetnode_status::{MemoryStore, NodeStatusLog, NodeStatusLogOptions};
use fleetnode_supervisor::{EngineProcessHandle, ExitStatus, LaunchSpec, ProcessSupervisor};
use fleetnode_volume::{
    CacheConfig, ContainerCreateOutcome, MountOptions, MountOutcome, RetryPolicy, VolumeAttachment,
    VolumeAttachmentOptions, VolumeBackend, VolumeCreateOutcome, VolumeHandle, WaitMode,
};
use fleetnode_volume_memory::{MemoryVolumeBackend, Operation};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    CreateContainer(String),
    CreateVolume(String),
    Mount(String),
    Unmount(String),
    Launch(LaunchSpec),
    Shutdown(SocketAddr),
    WaitExit,
    Kill,
    DrainOutput,
}

type Events = Arc<Mutex<Vec<Event>>>;

struct RecordingBackend {
    events: Events,
    inner: MemoryVolumeBackend,
}

#[async_trait]
impl VolumeBackend for RecordingBackend {
    type Error = fleetnode_volume_memory::Error;

    async fn initialize_cache(&self, cache: &CacheConfig) -> Result<(), Self::Error> {
        self.inner.initialize_cache(cache).await
    }

    async fn create_container_if_absent(
        &self,
        container_id: &str,
    ) -> Result<ContainerCreateOutcome, Self::Error> {
        self.events
            .lock()
            .push(Event::CreateContainer(container_id.to_string()));
        self.inner.create_container_if_absent(container_id).await
    }

    async fn create_volume_if_absent(
        &self,
        volume: &VolumeHandle,
    ) -> Result<VolumeCreateOutcome, Self::Error> {
        self.events
            .lock()
            .push(Event::CreateVolume(volume.object_id.clone()));
        self.inner.create_volume_if_absent(volume).await
    }

    async fn mount(
        &self,
        volume: &VolumeHandle,
        options: &MountOptions,
    ) -> Result<MountOutcome, Self::Error> {
        self.events
            .lock()
            .push(Event::Mount(volume.object_id.clone()));
        self.inner.mount(volume, options).await
    }

    async fn unmount(&self, volume: &VolumeHandle) -> Result<(), Self::Error> {
        self.events
            .lock()
            .push(Event::Unmount(volume.object_id.clone()));
        self.inner.unmount(volume).await
    }
}

#[derive(Clone, Copy, Default)]
struct Behavior {
    fail_kill: bool,
    fail_launch: bool,
    ignore_shutdown: bool,
}

struct FakeSupervisor {
    behavior: Behavior,
    events: Events,
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn launch(&self, spec: &LaunchSpec) -> fleetnode_supervisor::Result<EngineProcessHandle> {
        self.events.lock().push(Event::Launch(spec.clone()));

        if self.behavior.fail_launch {
            return Err(fleetnode_supervisor::Error::LaunchFailed {
                executable: "/opt/mongodb/bin/mongod".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let handle = EngineProcessHandle::new(4242, spec.port, &spec.data_path);
        handle.mark_running();
        Ok(handle)
    }

    async fn wait_for_exit(&self, handle: &EngineProcessHandle) -> ExitStatus {
        self.events.lock().push(Event::WaitExit);
        handle.wait_for_exit().await
    }

    async fn shutdown(&self, handle: &EngineProcessHandle, admin: SocketAddr) {
        self.events.lock().push(Event::Shutdown(admin));
        handle.mark_shutting_down();

        if !self.behavior.ignore_shutdown {
            handle.mark_exited(ExitStatus::Code(0));
        }
    }

    async fn kill(&self, handle: &EngineProcessHandle) -> fleetnode_supervisor::Result<()> {
        self.events.lock().push(Event::Kill);

        if self.behavior.fail_kill {
            return Err(fleetnode_supervisor::Error::MissingPid);
        }

        handle.mark_exited(ExitStatus::Signal(9));
        Ok(())
    }

    async fn wait_for_tasks(&self) {
        self.events.lock().push(Event::DrainOutput);
    }
}

type TestNode = Node<RecordingBackend, FakeSupervisor, MemoryStore>;

struct Harness {
    backend: MemoryVolumeBackend,
    dir: TempDir,
    events: Events,
    node: Arc<TestNode>,
    status_log: NodeStatusLog<MemoryStore>,
}

impl Harness {
    fn new(with_log_volume: bool, behavior: Behavior) -> Self {
        Self::on_store(MemoryVolumeBackend::new("MongoWorkerRole_IN_0"), with_log_volume, behavior)
    }

    fn on_store(backend: MemoryVolumeBackend, with_log_volume: bool, behavior: Behavior) -> Self {
        let dir = TempDir::new().unwrap();
        let events: Events = Arc::default();
        let status_log = NodeStatusLog::new(NodeStatusLogOptions {
            store: MemoryStore::new(),
            retain: None,
        });

        let attachment = VolumeAttachment::new(VolumeAttachmentOptions {
            backend: RecordingBackend {
                events: Arc::clone(&events),
                inner: backend.clone(),
            },
            cache: CacheConfig {
                path: dir.path().join("cache"),
                size_mb: 6144,
            },
            mount_cache_size_mb: 1024,
            retry_policy: RetryPolicy::default(),
        });

        let node = Node::new(NodeOptions {
            advertised_host: "10.0.0.4".to_string(),
            attachment,
            data_volume: data_volume(),
            instance_id: "MongoWorkerRole_IN_0".to_string(),
            log_volume: with_log_volume.then(log_volume),
            port: 27017,
            status_log: status_log.clone(),
            stop_grace: DEFAULT_STOP_GRACE,
            supervisor: FakeSupervisor {
                behavior,
                events: Arc::clone(&events),
            },
        });

        Self {
            backend,
            dir,
            events,
            node: Arc::new(node),
            status_log,
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn clear_events(&self) {
        self.events.lock().clear();
    }

    fn mount_path(&self, volume: &VolumeHandle) -> std::path::PathBuf {
        self.dir
            .path()
            .join("cache")
            .join(&volume.container_id)
            .join(&volume.object_id)
    }
}

fn data_volume() -> VolumeHandle {
    VolumeHandle::new("mongodb", "mongoddata.vhd", 5120)
}

fn log_volume() -> VolumeHandle {
    VolumeHandle::new("mongodb", "mongodlog.vhd", 1024)
}

fn admin() -> SocketAddr {
    "127.0.0.1:27017".parse().unwrap()
}

fn unmounted(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Unmount(object) => Some(object.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_start_sequence_without_log_volume() {
    let harness = Harness::new(false, Behavior::default());

    harness.node.start().await.unwrap();

    let data_root = harness.mount_path(&data_volume());
    assert_eq!(
        harness.events(),
        vec![
            Event::CreateContainer("mongodb".to_string()),
            Event::CreateVolume("mongoddata.vhd".to_string()),
            Event::Mount("mongoddata.vhd".to_string()),
            Event::Launch(LaunchSpec {
                data_path: data_root.join("data"),
                log_path: data_root.join("log").join("mongod.log"),
                port: 27017,
            }),
        ]
    );
    assert_eq!(harness.node.state(), NodeState::Running);
    assert!(data_root.join("data").is_dir());
    assert!(data_root.join("log").is_dir());
}

#[tokio::test]
async fn test_start_then_stop_with_log_volume() {
    let harness = Harness::new(true, Behavior::default());

    harness.node.start().await.unwrap();

    let data_root = harness.mount_path(&data_volume());
    let log_root = harness.mount_path(&log_volume());
    assert_eq!(
        harness.events(),
        vec![
            Event::CreateContainer("mongodb".to_string()),
            Event::CreateVolume("mongoddata.vhd".to_string()),
            Event::Mount("mongoddata.vhd".to_string()),
            Event::CreateContainer("mongodb".to_string()),
            Event::CreateVolume("mongodlog.vhd".to_string()),
            Event::Mount("mongodlog.vhd".to_string()),
            Event::Launch(LaunchSpec {
                data_path: data_root.join("data"),
                log_path: log_root.join("log").join("mongod.log"),
                port: 27017,
            }),
        ]
    );

    harness.clear_events();
    harness.node.stop().await;

    assert_eq!(
        harness.events(),
        vec![
            Event::Shutdown(admin()),
            Event::WaitExit,
            Event::DrainOutput,
            Event::Unmount("mongoddata.vhd".to_string()),
            Event::Unmount("mongodlog.vhd".to_string()),
        ]
    );
    assert_eq!(harness.node.state(), NodeState::Stopped);
    assert!(!harness.backend.is_held_by_self(&data_volume()));
    assert!(!harness.backend.is_held_by_self(&log_volume()));
}

#[tokio::test]
async fn test_start_records_status() {
    let harness = Harness::new(false, Behavior::default());

    harness.node.start().await.unwrap();

    let record = harness.status_log.latest().await.unwrap().unwrap();
    assert_eq!(record.instance_name, "MongoWorkerRole_IN_0");
    assert_eq!(record.instance_index, 0);
    assert_eq!(record.host, "10.0.0.4");
    assert_eq!(record.port, 27017);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_engine_is_killed_before_release() {
    let harness = Harness::new(
        true,
        Behavior {
            ignore_shutdown: true,
            ..Behavior::default()
        },
    );
    harness.node.start().await.unwrap();
    let engine = harness.node.engine().await.unwrap();
    harness.clear_events();

    let started = tokio::time::Instant::now();
    harness.node.stop().await;

    assert!(started.elapsed() >= DEFAULT_STOP_GRACE);
    assert_eq!(
        harness.events(),
        vec![
            Event::Shutdown(admin()),
            Event::WaitExit,
            Event::Kill,
            Event::WaitExit,
            Event::DrainOutput,
            Event::Unmount("mongoddata.vhd".to_string()),
            Event::Unmount("mongodlog.vhd".to_string()),
        ]
    );
    assert_eq!(
        engine.wait_for_exit().await,
        ExitStatus::Signal(9)
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_kill_still_releases_volumes() {
    let harness = Harness::new(
        true,
        Behavior {
            fail_kill: true,
            ignore_shutdown: true,
            ..Behavior::default()
        },
    );
    harness.node.start().await.unwrap();
    let engine = harness.node.engine().await.unwrap();
    harness.clear_events();

    let started = tokio::time::Instant::now();
    harness.node.stop().await;

    assert!(started.elapsed() >= DEFAULT_STOP_GRACE + KILL_WAIT);
    assert_eq!(
        harness.events(),
        vec![
            Event::Shutdown(admin()),
            Event::WaitExit,
            Event::Kill,
            Event::WaitExit,
            Event::DrainOutput,
            Event::Unmount("mongoddata.vhd".to_string()),
            Event::Unmount("mongodlog.vhd".to_string()),
        ]
    );
    assert!(!engine.has_exited());
    assert!(!harness.backend.is_held_by_self(&data_volume()));
    assert!(!harness.backend.is_held_by_self(&log_volume()));
    assert_eq!(harness.node.state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_failed_unmount_does_not_stop_release() {
    let harness = Harness::new(true, Behavior::default());
    harness.node.start().await.unwrap();
    harness.backend.fail_next(Operation::Unmount);

    harness.node.stop().await;

    assert_eq!(
        unmounted(&harness.events()),
        vec!["mongoddata.vhd".to_string(), "mongodlog.vhd".to_string()]
    );
    assert!(!harness.backend.is_held_by_self(&log_volume()));
    assert_eq!(harness.node.state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_launch_failure_unwinds_mounts() {
    let harness = Harness::new(
        true,
        Behavior {
            fail_launch: true,
            ..Behavior::default()
        },
    );

    let result = harness.node.start().await;

    assert_matches!(result, Err(Error::Launch(_)));
    assert_eq!(
        unmounted(&harness.events()),
        vec!["mongodlog.vhd".to_string(), "mongoddata.vhd".to_string()]
    );
    assert!(!harness.backend.is_held_by_self(&data_volume()));
    assert_eq!(harness.node.state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_locked_log_volume_fails_start() {
    let store = MemoryVolumeBackend::new("MongoWorkerRole_IN_0");
    let other = store.instance("MongoWorkerRole_IN_1");
    let other_attachment = VolumeAttachment::new(VolumeAttachmentOptions {
        backend: other,
        cache: CacheConfig {
            path: std::env::temp_dir().join("fleetnode-other-cache"),
            size_mb: 64,
        },
        mount_cache_size_mb: 16,
        retry_policy: RetryPolicy::default(),
    });
    other_attachment
        .acquire(&log_volume(), WaitMode::FailFast, &CancellationToken::new())
        .await
        .unwrap();

    let harness = Harness::on_store(store, true, Behavior::default());
    let result = harness.node.start().await;

    assert_matches!(result, Err(Error::Volume { role: "log", .. }));
    assert!(!harness.backend.is_held_by_self(&data_volume()));
    assert!(
        !harness
            .events()
            .iter()
            .any(|event| matches!(event, Event::Launch(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_waiting_for_data_volume() {
    let store = MemoryVolumeBackend::new("MongoWorkerRole_IN_0");
    let other = store.instance("MongoWorkerRole_IN_1");
    let other_attachment = VolumeAttachment::new(VolumeAttachmentOptions {
        backend: other,
        cache: CacheConfig {
            path: std::env::temp_dir().join("fleetnode-other-cache"),
            size_mb: 64,
        },
        mount_cache_size_mb: 16,
        retry_policy: RetryPolicy::default(),
    });
    other_attachment
        .acquire(&data_volume(), WaitMode::FailFast, &CancellationToken::new())
        .await
        .unwrap();

    let harness = Harness::on_store(store, false, Behavior::default());
    let starting = {
        let node = Arc::clone(&harness.node);
        tokio::spawn(async move { node.start().await })
    };

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(harness.node.state(), NodeState::Attaching);

    harness.node.stop().await;

    assert_matches!(
        starting.await.unwrap(),
        Err(Error::Volume {
            role: "data",
            source: fleetnode_volume::Error::Cancelled(_),
        })
    );
    assert_eq!(harness.node.state(), NodeState::Stopped);
    assert!(
        !harness
            .events()
            .iter()
            .any(|event| matches!(event, Event::Launch(_) | Event::Shutdown(_)))
    );
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let harness = Harness::new(false, Behavior::default());
    harness.node.start().await.unwrap();

    harness.node.stop().await;
    let after_first = harness.events().len();
    harness.node.stop().await;

    assert_eq!(harness.events().len(), after_first);
    assert_eq!(harness.node.state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_stop_before_start() {
    let harness = Harness::new(false, Behavior::default());

    harness.node.stop().await;

    assert!(harness.events().is_empty());
    assert_eq!(harness.node.state(), NodeState::Stopped);
    assert_matches!(
        harness.node.start().await,
        Err(Error::AlreadyStarted(NodeState::Stopped))
    );
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let harness = Harness::new(false, Behavior::default());
    harness.node.start().await.unwrap();

    assert_matches!(
        harness.node.start().await,
        Err(Error::AlreadyStarted(NodeState::Running))
    );
}

#[tokio::test]
async fn test_run_and_stop_tasks_both_finish() {
    let harness = Harness::new(true, Behavior::default());
    Bootable::start(harness.node.as_ref()).await.unwrap();

    let run = {
        let node = Arc::clone(&harness.node);
        tokio::spawn(async move { Bootable::wait(node.as_ref()).await })
    };
    let stop = {
        let node = Arc::clone(&harness.node);
        tokio::spawn(async move { Bootable::shutdown(node.as_ref()).await })
    };

    let (run, stop) = tokio::join!(run, stop);
    run.unwrap();
    stop.unwrap();

    assert_eq!(harness.node.state(), NodeState::Stopped);
    assert_eq!(harness.node.name(), "MongoWorkerRole_IN_0");
}

#[tokio::test]
async fn test_engine_crash_ends_wait() {
    let harness = Harness::new(false, Behavior::default());
    harness.node.start().await.unwrap();
    let engine = harness.node.engine().await.unwrap();

    engine.mark_exited(ExitStatus::Code(100));
    harness.node.wait().await;

    harness.node.stop().await;
    assert_eq!(
        unmounted(&harness.events()),
        vec!["mongoddata.vhd".to_string()]
    );
}
