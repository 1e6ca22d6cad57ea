//! Network Client
//!
//! Opens one connection per message, writes a single line, and closes.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::Messenger;
use crate::config::TransportConfig;
use crate::directory::{NodeId, PeerDirectory};
use crate::protocol::Message;
use crate::error::{Error, Result};

/// TCP messenger that resolves peers through the static directory
pub struct TcpMessenger {
    /// Peer id -> endpoint
    directory: Arc<PeerDirectory>,
    /// Connection timeout
    connect_timeout: Duration,
    /// Write timeout
    write_timeout: Duration,
}

impl TcpMessenger {
    /// Create a new messenger
    pub fn new(directory: Arc<PeerDirectory>, config: &TransportConfig) -> Self {
        Self {
            directory,
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

#[async_trait]
impl Messenger for TcpMessenger {
    async fn send(&self, target: NodeId, message: Message) -> Result<()> {
        let address = self
            .directory
            .endpoint(target)
            .ok_or(Error::UnknownPeer(target))?;

        tracing::trace!("Sending {} to node {} at {}", message, target, address);
        send_once(address, message, self.connect_timeout, self.write_timeout).await
    }
}

/// Deliver a single message to `address` over a fresh connection
pub async fn send_once(
    address: &str,
    message: Message,
    connect_timeout: Duration,
    write_timeout: Duration,
) -> Result<()> {
    let mut stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => return Err(Error::ConnectionTimeout(address.to_string())),
    };
    stream.set_nodelay(true)?;

    let line = message.to_line();
    let write = async {
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await
    };

    match timeout(write_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::ConnectionFailed {
            address: address.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
    }
}
