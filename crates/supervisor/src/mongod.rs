use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fleetnode_wire::AdminClient;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Level, debug, error, info, info_span, warn};

use crate::error::{Error, Result};
use crate::handle::{EngineProcessHandle, ExitStatus};
use crate::supervisor::{LaunchSpec, ProcessSupervisor};

/// Options for configuring a `MongodSupervisor`.
pub struct MongodSupervisorOptions {
    /// Control-channel timeout for the shutdown command.
    pub admin_timeout: Duration,

    /// Path to the `mongod` binary.
    pub executable: PathBuf,

    /// Arguments appended after the fixed command line.
    pub extra_args: Vec<String>,
}

/// Supervises a `mongod` child process.
pub struct MongodSupervisor {
    admin_timeout: Duration,
    executable: PathBuf,
    extra_args: Vec<String>,
    task_tracker: TaskTracker,
}

impl MongodSupervisor {
    /// Creates a new instance of `MongodSupervisor`.
    #[must_use]
    pub fn new(
        MongodSupervisorOptions {
            admin_timeout,
            executable,
            extra_args,
        }: MongodSupervisorOptions,
    ) -> Self {
        Self {
            admin_timeout,
            executable,
            extra_args,
            task_tracker: TaskTracker::new(),
        }
    }

    fn args(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut args = command_line(spec);
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn signal(handle: &EngineProcessHandle, sig: Signal) -> Result<()> {
        let to_error = |source| Error::Signal {
            pid: handle.pid(),
            signal: sig.as_str(),
            source,
        };

        let pid = i32::try_from(handle.pid()).map_err(|_| to_error(nix::errno::Errno::ESRCH))?;

        signal::kill(Pid::from_raw(pid), sig).map_err(to_error)
    }
}

/// The fixed `mongod` command line for `spec`.
#[must_use]
pub fn command_line(spec: &LaunchSpec) -> Vec<String> {
    vec![
        "--dbpath".to_string(),
        spec.data_path.display().to_string(),
        "--port".to_string(),
        spec.port.to_string(),
        "--logpath".to_string(),
        spec.log_path.display().to_string(),
        "--nohttpinterface".to_string(),
        "--logappend".to_string(),
    ]
}

#[derive(Deserialize)]
struct StructuredLine {
    #[serde(rename = "s")]
    severity: String,
    #[serde(rename = "c", default)]
    component: Option<String>,
    msg: String,
}

/// Maps one line of engine output to a level and message.
///
/// Structured (JSON) lines use their severity field; anything else is
/// passed through at info.
fn classify_line(line: &str) -> (Level, String) {
    let Ok(parsed) = serde_json::from_str::<StructuredLine>(line) else {
        return (Level::INFO, line.to_string());
    };

    let level = match parsed.severity.as_str() {
        "F" | "E" => Level::ERROR,
        "W" => Level::WARN,
        "I" => Level::INFO,
        s if s.starts_with('D') => Level::DEBUG,
        _ => Level::INFO,
    };

    let message = match parsed.component {
        Some(component) => format!("[{}] {}", component.trim(), parsed.msg),
        None => parsed.msg,
    };

    (level, message)
}

fn log_engine_line(line: &str) {
    let (level, message) = classify_line(line);

    match level {
        Level::ERROR => error!(target: "mongod", "{}", message),
        Level::WARN => warn!(target: "mongod", "{}", message),
        Level::DEBUG | Level::TRACE => debug!(target: "mongod", "{}", message),
        _ => info!(target: "mongod", "{}", message),
    }
}

#[async_trait]
impl ProcessSupervisor for MongodSupervisor {
    async fn launch(&self, spec: &LaunchSpec) -> Result<EngineProcessHandle> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // keep terminal signals meant for the supervisor away from the engine
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("spawning engine: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| Error::LaunchFailed {
            executable: self.executable.display().to_string(),
            source,
        })?;

        let pid = child.id().ok_or(Error::MissingPid)?;
        let handle = EngineProcessHandle::new(pid, spec.port, &spec.data_path);
        let span = info_span!("engine", pid);

        if let Some(stdout) = child.stdout.take() {
            self.task_tracker.spawn(
                async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log_engine_line(&line);
                    }
                }
                .instrument(span.clone()),
            );
        }

        if let Some(stderr) = child.stderr.take() {
            self.task_tracker.spawn(
                async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log_engine_line(&line);
                    }
                }
                .instrument(span.clone()),
            );
        }

        let monitor = handle.clone();
        self.task_tracker.spawn(
            async move {
                let status = match child.wait().await {
                    Ok(status) => ExitStatus::from(status),
                    Err(e) => {
                        error!("failed to wait for engine process: {}", e);
                        ExitStatus::Unknown
                    }
                };

                if status.success() {
                    info!("engine exited with {}", status);
                } else {
                    error!("engine exited with {}", status);
                }

                monitor.mark_exited(status);
            }
            .instrument(span),
        );

        handle.mark_running();
        info!(pid, port = spec.port, path = %spec.data_path.display(), "engine launched");

        Ok(handle)
    }

    async fn shutdown(&self, handle: &EngineProcessHandle, admin: SocketAddr) {
        if !handle.mark_shutting_down() {
            debug!(
                pid = handle.pid(),
                state = ?handle.state(),
                "engine not running, skipping shutdown command"
            );
            return;
        }

        let client = AdminClient::new(admin).with_timeout(self.admin_timeout);
        match client.shutdown_server(false).await {
            Ok(()) => info!(pid = handle.pid(), %admin, "sent shutdown command"),
            Err(e) => {
                warn!(pid = handle.pid(), %admin, "failed to send shutdown command: {}", e);

                if let Err(e) = Self::signal(handle, Signal::SIGTERM) {
                    warn!("{}", e);
                }
            }
        }
    }

    async fn kill(&self, handle: &EngineProcessHandle) -> Result<()> {
        if handle.has_exited() {
            return Ok(());
        }

        warn!(pid = handle.pid(), "killing engine");
        Self::signal(handle, Signal::SIGKILL)
    }

    async fn wait_for_tasks(&self) {
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}
