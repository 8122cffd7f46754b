use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

/// How the engine process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited on its own with a status code.
    Code(i32),

    /// Terminated by a signal.
    Signal(i32),

    /// Exit observed but the status could not be collected.
    Unknown,
}

impl ExitStatus {
    /// Whether the process exited cleanly with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;

            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }

        Self::Unknown
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Unknown => write!(f, "unknown status"),
        }
    }
}

/// Lifecycle of one engine process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Spawn in progress.
    Starting,

    /// The OS process exists.
    Running,

    /// A graceful stop has been requested.
    ShuttingDown,

    /// The process is gone. Terminal.
    Exited(ExitStatus),
}

/// Shared view of a launched engine process.
///
/// Clones observe the same state. Once `Exited` the handle never changes
/// again; a relaunch produces a new handle.
#[derive(Clone, Debug)]
pub struct EngineProcessHandle {
    bound_path: PathBuf,
    bound_port: u16,
    pid: u32,
    state: Arc<watch::Sender<EngineState>>,
}

impl EngineProcessHandle {
    /// Creates a handle in the `Starting` state.
    #[must_use]
    pub fn new(pid: u32, bound_port: u16, bound_path: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(EngineState::Starting);

        Self {
            bound_path: bound_path.into(),
            bound_port,
            pid,
            state: Arc::new(state),
        }
    }

    /// OS process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Port the engine listens on.
    #[must_use]
    pub const fn bound_port(&self) -> u16 {
        self.bound_port
    }

    /// Data directory the engine was started on.
    #[must_use]
    pub fn bound_path(&self) -> &Path {
        &self.bound_path
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Whether the process has exited.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        matches!(self.state(), EngineState::Exited(_))
    }

    /// `Starting -> Running`. Returns whether the transition happened.
    pub fn mark_running(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == EngineState::Starting {
                *state = EngineState::Running;
                true
            } else {
                false
            }
        })
    }

    /// `Starting | Running -> ShuttingDown`. Returns whether the transition
    /// happened.
    pub fn mark_shutting_down(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, EngineState::Starting | EngineState::Running) {
                *state = EngineState::ShuttingDown;
                true
            } else {
                false
            }
        })
    }

    /// Any live state `-> Exited(status)`. The first recorded exit wins.
    pub fn mark_exited(&self, status: ExitStatus) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, EngineState::Exited(_)) {
                false
            } else {
                *state = EngineState::Exited(status);
                true
            }
        })
    }

    /// Waits until the process has exited.
    ///
    /// Cancel-safe: dropping the future leaves the handle untouched.
    pub async fn wait_for_exit(&self) -> ExitStatus {
        let mut rx = self.state.subscribe();

        match rx
            .wait_for(|state| matches!(state, EngineState::Exited(_)))
            .await
        {
            Ok(state) => match *state {
                EngineState::Exited(status) => status,
                _ => ExitStatus::Unknown,
            },
            // the handle owns the sender, so this is unreachable while
            // `self` is alive
            Err(_) => ExitStatus::Unknown,
        }
    }
}
