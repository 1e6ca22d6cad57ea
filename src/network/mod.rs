//! Network Module
//!
//! One-shot TCP transport for election messages. Every message travels on
//! its own connection; replies are new connections in the other direction.

mod server;
mod client;

pub use server::NetworkServer;
pub use client::{TcpMessenger, send_once};

use async_trait::async_trait;

use crate::directory::NodeId;
use crate::protocol::Message;
use crate::error::Result;

/// Fire-and-forget delivery of a single message to a peer.
///
/// `Ok(())` means the line was handed to the peer. Any error means the peer
/// is presumed unreachable; callers must never treat it as fatal.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// Deliver `message` to the peer identified by `target`
    async fn send(&self, target: NodeId, message: Message) -> Result<()>;
}
