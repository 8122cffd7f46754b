//! Runs one fleet node, or inspects a fleet, from the command line.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod commands;
mod error;
mod logging;

use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.trace_log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            let shutdown_token = CancellationToken::new();
            spawn_signal_handler(shutdown_token.clone())?;

            commands::run(*args, shutdown_token).await
        }
        Commands::Discover(args) => commands::discover(args).await,
        Commands::Status(args) => commands::status(args).await,
    }
}

fn spawn_signal_handler(shutdown_token: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Io("failed to create SIGTERM signal", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Io("failed to create SIGINT signal", e))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("received SIGINT, initiating shutdown"),
        }

        shutdown_token.cancel();
    });

    Ok(())
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Also write plain-text traces to this file
    #[arg(long, global = true, env = "FLEETNODE_TRACE_LOG_FILE")]
    trace_log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Attach the volumes, run the engine until signalled, then release
    Run(Box<RunArgs>),
    /// Print the first reachable member of a fleet
    Discover(DiscoverArgs),
    /// Print the most recent node start records
    Status(StatusArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Seconds to wait for the admin shutdown command's connection
    #[arg(long, default_value_t = 5, env = "FLEETNODE_ADMIN_TIMEOUT_SECS")]
    admin_timeout_secs: u64,

    /// Host other fleet members reach this node on
    #[arg(long, default_value = "127.0.0.1", env = "FLEETNODE_ADVERTISED_HOST")]
    advertised_host: String,

    /// Local volume cache directory
    #[arg(
        long,
        default_value = "/var/lib/fleetnode/cache",
        env = "FLEETNODE_CACHE_DIR"
    )]
    cache_dir: PathBuf,

    /// Local volume cache size
    #[arg(long, default_value_t = 6144, env = "FLEETNODE_CACHE_SIZE_MB")]
    cache_size_mb: u64,

    /// Container holding the node's volumes
    #[arg(long, default_value = "mongodb", env = "FLEETNODE_CONTAINER")]
    container: String,

    /// Data volume size
    #[arg(long, default_value_t = 5120, env = "FLEETNODE_DATA_SIZE_MB")]
    data_size_mb: u64,

    /// Data volume name
    #[arg(long, default_value = "mongoddata.vhd", env = "FLEETNODE_DATA_VOLUME")]
    data_volume: String,

    /// Identifier of this instance, also the lease holder name
    #[arg(long, env = "FLEETNODE_INSTANCE_ID")]
    instance_id: String,

    /// Log volume size
    #[arg(long, default_value_t = 1024, env = "FLEETNODE_LOG_SIZE_MB")]
    log_size_mb: u64,

    /// Separate log volume name; logs go on the data volume when unset
    #[arg(long, env = "FLEETNODE_LOG_VOLUME")]
    log_volume: Option<String>,

    /// Give up acquiring the data volume after this many attempts
    #[arg(long, env = "FLEETNODE_MAX_MOUNT_ATTEMPTS")]
    max_mount_attempts: Option<u32>,

    /// Extra arguments passed to mongod, repeatable or comma separated
    #[arg(
        long,
        allow_hyphen_values = true,
        value_delimiter = ',',
        env = "FLEETNODE_MONGOD_ARGS"
    )]
    mongod_arg: Vec<String>,

    /// Path to the mongod executable
    #[arg(long, default_value = "mongod", env = "FLEETNODE_MONGOD_PATH")]
    mongod_path: PathBuf,

    /// Cache share requested for each mounted volume
    #[arg(long, default_value_t = 1024, env = "FLEETNODE_MOUNT_CACHE_SIZE_MB")]
    mount_cache_size_mb: u64,

    /// Seconds between attempts on a locked data volume
    #[arg(long, default_value_t = 30, env = "FLEETNODE_MOUNT_RETRY_SECS")]
    mount_retry_secs: u64,

    /// Engine port
    #[arg(long, default_value_t = 27017, env = "FLEETNODE_PORT")]
    port: u16,

    /// Status log directory
    #[arg(
        long,
        default_value = "/var/lib/fleetnode/status",
        env = "FLEETNODE_STATUS_DIR"
    )]
    status_dir: PathBuf,

    /// Keep only this many status records
    #[arg(long, env = "FLEETNODE_STATUS_RETAIN")]
    status_retain: Option<usize>,

    /// Seconds to wait for a graceful engine exit before killing it
    #[arg(long, default_value_t = 15, env = "FLEETNODE_STOP_GRACE_SECS")]
    stop_grace_secs: u64,

    /// Root directory of the shared volume store
    #[arg(
        long,
        default_value = "/var/lib/fleetnode/volumes",
        env = "FLEETNODE_VOLUME_ROOT"
    )]
    volume_root: PathBuf,
}

#[derive(Debug, Parser)]
struct DiscoverArgs {
    /// JSON fleet file listing the members
    #[arg(long, env = "FLEETNODE_FLEET_FILE")]
    fleet_file: PathBuf,

    /// Require a `hello` reply instead of a bare TCP connect
    #[arg(long, default_value_t = false, env = "FLEETNODE_HANDSHAKE")]
    handshake: bool,

    /// Per-candidate probe timeout
    #[arg(long, default_value_t = 2000, env = "FLEETNODE_PROBE_TIMEOUT_MS")]
    probe_timeout_ms: u64,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    /// Number of records to print, newest first
    #[arg(long, default_value_t = 1, env = "FLEETNODE_STATUS_LIMIT")]
    limit: usize,

    /// Status log directory
    #[arg(
        long,
        default_value = "/var/lib/fleetnode/status",
        env = "FLEETNODE_STATUS_DIR"
    )]
    status_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["fleetnode", "run", "--instance-id", "MongoWorkerRole_IN_1"])
            .unwrap();

        let args = assert_matches!(cli.command, Commands::Run(args) => args);
        assert_eq!(args.instance_id, "MongoWorkerRole_IN_1");
        assert_eq!(args.port, 27017);
        assert_eq!(args.data_size_mb, 5120);
        assert_eq!(args.mount_retry_secs, 30);
        assert_eq!(args.stop_grace_secs, 15);
        assert_eq!(args.log_volume, None);
        assert_eq!(args.max_mount_attempts, None);
    }

    #[test]
    fn test_run_requires_instance_id() {
        assert!(Cli::try_parse_from(["fleetnode", "run"]).is_err());
    }

    #[test]
    fn test_repeated_mongod_args() {
        let cli = Cli::try_parse_from([
            "fleetnode",
            "run",
            "--instance-id",
            "MongoWorkerRole_IN_0",
            "--log-volume",
            "mongodlog.vhd",
            "--mongod-arg",
            "--replSet",
            "--mongod-arg",
            "rs0",
        ])
        .unwrap();

        let args = assert_matches!(cli.command, Commands::Run(args) => args);
        assert_eq!(args.log_volume.as_deref(), Some("mongodlog.vhd"));
        assert_eq!(args.mongod_arg, vec!["--replSet", "rs0"]);
    }

    #[test]
    fn test_comma_separated_mongod_args() {
        let cli = Cli::try_parse_from([
            "fleetnode",
            "run",
            "--instance-id",
            "MongoWorkerRole_IN_0",
            "--mongod-arg",
            "--replSet,rs0",
            "--mongod-arg",
            "--quiet",
        ])
        .unwrap();

        let args = assert_matches!(cli.command, Commands::Run(args) => args);
        assert_eq!(args.mongod_arg, vec!["--replSet", "rs0", "--quiet"]);
    }

    #[test]
    fn test_trace_log_file_is_global() {
        let cli = Cli::try_parse_from([
            "fleetnode",
            "status",
            "--trace-log-file",
            "/tmp/fleetnode.trace",
        ])
        .unwrap();

        assert_eq!(cli.trace_log_file, Some(PathBuf::from("/tmp/fleetnode.trace")));
        assert_matches!(cli.command, Commands::Status(StatusArgs { limit: 1, .. }));
    }
}
