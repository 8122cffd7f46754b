use std::net::SocketAddr;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::handle::{EngineProcessHandle, ExitStatus};

/// What to launch the engine on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Directory holding the engine's data files.
    pub data_path: PathBuf,

    /// File the engine appends its log to.
    pub log_path: PathBuf,

    /// Port the engine listens on.
    pub port: u16,
}

/// Launches and supervises the database engine as an opaque child process.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync + 'static {
    /// Starts the engine and returns a handle in the `Running` state.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if the OS process could not be created.
    async fn launch(&self, spec: &LaunchSpec) -> Result<EngineProcessHandle>;

    /// Waits for the engine to exit. Cancel-safe.
    async fn wait_for_exit(&self, handle: &EngineProcessHandle) -> ExitStatus {
        handle.wait_for_exit().await
    }

    /// Asks the engine to stop gracefully via its control channel at `admin`.
    ///
    /// Does not wait for the process to exit. Failures are logged only.
    async fn shutdown(&self, handle: &EngineProcessHandle, admin: SocketAddr);

    /// Terminates the engine immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be signalled.
    async fn kill(&self, handle: &EngineProcessHandle) -> Result<()>;

    /// Waits until the output forwarding and exit monitoring of every
    /// launched engine have finished.
    ///
    /// Called once the node is done with the engine; no launches follow.
    async fn wait_for_tasks(&self) {}
}
