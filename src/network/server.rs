//! Network Server
//!
//! Accepts one connection per inbound message and forwards each decoded
//! message to the node's dispatch loop.

use std::net::SocketAddr;
use std::time::Duration;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::protocol::Message;
use crate::error::{Error, Result};

/// Pause after a failed accept so a persistent fault does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Listener for election traffic
pub struct NetworkServer {
    /// Bound listener
    listener: TcpListener,
    /// Longest accepted line
    max_line_bytes: usize,
    /// How long a connection may take to deliver its line
    read_timeout: Duration,
}

impl NetworkServer {
    /// Bind the listener
    pub async fn bind(bind_address: &str, config: &TransportConfig) -> Result<Self> {
        let listener = TcpListener::bind(bind_address).await.map_err(|e| {
            Error::Network(format!("Failed to bind {}: {}", bind_address, e))
        })?;

        Ok(Self {
            listener,
            max_line_bytes: config.max_line_bytes,
            read_timeout: config.connect_timeout() + config.write_timeout(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Accept and read failures are logged; the loop keeps running.
    pub async fn run(
        self,
        incoming_tx: mpsc::Sender<(SocketAddr, Message)>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Election listener accepting on {:?}", self.listener.local_addr().ok());

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            let incoming_tx = incoming_tx.clone();
                            let max_line_bytes = self.max_line_bytes;
                            let read_timeout = self.read_timeout;

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, peer_addr, max_line_bytes, read_timeout, incoming_tx).await {
                                    tracing::debug!("Dropped message from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    break;
                }
            }
        }

        tracing::info!("Election listener stopped");
    }
}

/// Read the single line a connection carries and forward it
async fn handle_connection(
    socket: TcpStream,
    peer_addr: SocketAddr,
    max_line_bytes: usize,
    read_timeout: Duration,
    incoming_tx: mpsc::Sender<(SocketAddr, Message)>,
) -> Result<()> {
    let mut lines = FramedRead::new(socket, LinesCodec::new_with_max_length(max_line_bytes));

    let line = match tokio::time::timeout(read_timeout, lines.next()).await {
        Ok(Some(Ok(line))) => line,
        Ok(Some(Err(e))) => return Err(Error::Network(format!("read failed: {}", e))),
        Ok(None) => return Ok(()),
        Err(_) => return Err(Error::ConnectionTimeout(peer_addr.to_string())),
    };

    let message = match line.parse::<Message>() {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Ignoring message from {}: {}", peer_addr, e);
            return Ok(());
        }
    };

    tracing::trace!("Received {} from {}", message, peer_addr);

    incoming_tx
        .send((peer_addr, message))
        .await
        .map_err(|_| Error::Internal("dispatch loop has stopped".into()))
}
