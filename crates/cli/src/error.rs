use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] fleetnode_discovery::Error),

    #[error("engine exited while the node was running")]
    EngineExited,

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error(transparent)]
    Node(#[from] fleetnode_node::Error),

    #[error(transparent)]
    Status(#[from] fleetnode_status::Error),

    #[error("stop task failed: {0}")]
    StopTask(#[from] tokio::task::JoinError),
}
