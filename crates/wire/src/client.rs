//! Control-channel client for a running engine.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::bson::Document;
use crate::codec::{OpMsg, OpMsgCodec};
use crate::commands;
use crate::error::{Error, Result};

/// Default time allowed for connecting and for each reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends admin commands to an engine listening on `addr`.
///
/// Every call opens its own connection; the engine is only ever spoken to a
/// handful of times per lifecycle.
#[derive(Debug)]
pub struct AdminClient {
    addr: SocketAddr,
    next_request_id: AtomicI32,
    timeout: Duration,
}

impl AdminClient {
    /// Creates a client for the engine at `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            next_request_id: AtomicI32::new(1),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the connect and reply timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Address this client talks to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn connect(&self) -> Result<Framed<TcpStream, OpMsgCodec>> {
        let stream = timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| Error::Timeout("connect"))?
            .map_err(|e| Error::Io("failed to connect to engine", e))?;

        stream
            .set_nodelay(true)
            .map_err(|e| Error::Io("failed to set TCP_NODELAY", e))?;

        Ok(Framed::new(stream, OpMsgCodec::new()))
    }

    fn request(&self, command: Document) -> OpMsg {
        OpMsg::request(
            self.next_request_id.fetch_add(1, Ordering::Relaxed),
            command,
        )
    }

    /// Sends `command` without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached or the write fails.
    pub async fn send_command(&self, command: Document) -> Result<()> {
        let mut framed = self.connect().await?;
        let msg = self.request(command).more_to_come();

        trace!(request_id = msg.request_id, addr = %self.addr, "sending command");

        timeout(self.timeout, framed.send(msg))
            .await
            .map_err(|_| Error::Timeout("send"))?
    }

    /// Sends `command` and returns the reply body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the reply does not carry `ok: 1`,
    /// or a transport error if no reply arrives.
    pub async fn run_command(&self, command: Document) -> Result<Document> {
        let mut framed = self.connect().await?;
        let msg = self.request(command);
        let request_id = msg.request_id;

        timeout(self.timeout, framed.send(msg))
            .await
            .map_err(|_| Error::Timeout("send"))??;

        loop {
            let reply = timeout(self.timeout, framed.next())
                .await
                .map_err(|_| Error::Timeout("reply"))?
                .ok_or(Error::ConnectionClosed)??;

            if reply.response_to != request_id {
                debug!(
                    expected = request_id,
                    got = reply.response_to,
                    "ignoring unrelated reply"
                );
                continue;
            }

            if reply.body.is_ok() {
                return Ok(reply.body);
            }

            let message = reply
                .body
                .get_str("errmsg")
                .unwrap_or("no error message")
                .to_string();
            return Err(Error::CommandFailed(message));
        }
    }

    /// Asks the engine to shut down cleanly.
    ///
    /// The engine normally drops the connection instead of replying, so a
    /// closed connection after the command was written counts as accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached or refuses the
    /// command.
    pub async fn shutdown_server(&self, force: bool) -> Result<()> {
        match self.run_command(commands::shutdown(force)).await {
            Ok(_) | Err(Error::ConnectionClosed) => Ok(()),
            Err(Error::Io(context, e)) if context == "codec io error" => {
                debug!(error = %e, "connection dropped after shutdown command");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs `hello` and returns the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not answer with `ok: 1`.
    pub async fn hello(&self) -> Result<Document> {
        self.run_command(commands::hello()).await
    }
}
