use std::sync::Arc;
use std::time::Duration;

use fleetnode_node::{Node, NodeOptions};
use fleetnode_status::{FsStore, NodeStatusLog, NodeStatusLogOptions};
use fleetnode_supervisor::{MongodSupervisor, MongodSupervisorOptions};
use fleetnode_volume::{
    CacheConfig, RetryPolicy, VolumeAttachment, VolumeAttachmentOptions, VolumeHandle,
};
use fleetnode_volume_fs::{FsVolumeBackend, FsVolumeBackendOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::RunArgs;
use crate::error::{Error, Result};

pub async fn run(args: RunArgs, shutdown_token: CancellationToken) -> Result<()> {
    let node = Arc::new(build_node(args));

    let stopper = {
        let node = Arc::clone(&node);
        let shutdown_token = shutdown_token.clone();
        tokio::spawn(async move {
            shutdown_token.cancelled().await;
            node.stop().await;
        })
    };

    if let Err(e) = node.start().await {
        if shutdown_token.is_cancelled() {
            info!("start abandoned on shutdown: {}", e);
            stopper.await?;
            return Ok(());
        }

        stopper.abort();
        return Err(e.into());
    }

    info!(addr = %node.admin_addr(), "node running");

    node.wait().await;

    let requested = shutdown_token.is_cancelled();
    shutdown_token.cancel();
    stopper.await?;

    if requested {
        info!("node stopped");
        Ok(())
    } else {
        error!("engine exited unexpectedly, volumes released");
        Err(Error::EngineExited)
    }
}

fn build_node(args: RunArgs) -> Node<FsVolumeBackend, MongodSupervisor, FsStore> {
    let backend = FsVolumeBackend::new(FsVolumeBackendOptions {
        holder: args.instance_id.clone(),
        root: args.volume_root,
    });

    let attachment = VolumeAttachment::new(VolumeAttachmentOptions {
        backend,
        cache: CacheConfig {
            path: args.cache_dir,
            size_mb: args.cache_size_mb,
        },
        mount_cache_size_mb: args.mount_cache_size_mb,
        retry_policy: RetryPolicy {
            interval: Duration::from_secs(args.mount_retry_secs),
            max_attempts: args.max_mount_attempts,
        },
    });

    let supervisor = MongodSupervisor::new(MongodSupervisorOptions {
        admin_timeout: Duration::from_secs(args.admin_timeout_secs),
        executable: args.mongod_path,
        extra_args: args.mongod_arg,
    });

    let status_log = NodeStatusLog::new(NodeStatusLogOptions {
        store: FsStore::new(args.status_dir),
        retain: args.status_retain,
    });

    Node::new(NodeOptions {
        advertised_host: args.advertised_host,
        attachment,
        data_volume: VolumeHandle::new(&args.container, &args.data_volume, args.data_size_mb),
        instance_id: args.instance_id,
        log_volume: args
            .log_volume
            .map(|object_id| VolumeHandle::new(&args.container, object_id, args.log_size_mb)),
        port: args.port,
        status_log,
        stop_grace: Duration::from_secs(args.stop_grace_secs),
        supervisor,
    })
}
