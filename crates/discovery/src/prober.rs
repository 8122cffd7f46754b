use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use fleetnode_wire::AdminClient;
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// A liveness check against one resolved address.
///
/// Implementations need not bound their own running time; discovery wraps
/// every probe in its own timeout.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    /// Succeeds if something is serving at `addr`.
    async fn probe(&self, addr: SocketAddr) -> Result<()>;
}

/// Probes by opening a TCP connection and closing it straight away.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnectProber;

#[async_trait]
impl Prober for TcpConnectProber {
    async fn probe(&self, addr: SocketAddr) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Io("connect failed", e))?;
        drop(stream);

        Ok(())
    }
}

/// Probes by running `hello` over the engine wire protocol.
///
/// Catches a port that accepts connections while the engine is not yet
/// answering commands.
#[derive(Clone, Copy, Debug)]
pub struct HandshakeProber {
    timeout: Duration,
}

impl HandshakeProber {
    /// Creates a prober whose connect and reply each get `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Prober for HandshakeProber {
    async fn probe(&self, addr: SocketAddr) -> Result<()> {
        AdminClient::new(addr)
            .with_timeout(self.timeout)
            .hello()
            .await
            .map_err(|e| match e {
                fleetnode_wire::Error::CommandFailed(msg) => {
                    Error::ProbeRejected(format!("{addr} refused hello: {msg}"))
                }
                e => Error::Wire(e),
            })?;

        Ok(())
    }
}
