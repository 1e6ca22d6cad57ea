//! Bully Election - Leader Election and Failure Detection
//!
//! A fixed group of uniquely numbered nodes agrees on exactly one leader
//! using the bully algorithm: the live node with the highest id wins, and
//! the group re-elects when the leader's announcements stop.
//!
//! # Architecture
//!
//! Each node runs three concurrent activities around one
//! [`ElectionEngine`](election::ElectionEngine):
//!
//! - an inbound listener that accepts one connection per message
//! - a heartbeat monitor that re-announces leadership or detects a silent leader
//! - at most one pending election backoff timer per round
//!
//! All three serialize on the engine's single state lock.
//!
//! # Wire protocol
//!
//! Newline-terminated text, one message per connection: `ELECTION:<id>`,
//! `OK:<id>`, `LEADER:<id>`, `HEARTBEAT`.

pub mod config;
pub mod error;
pub mod directory;
pub mod protocol;
pub mod network;
pub mod election;
pub mod api;
pub mod node;

pub use config::ClusterConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ClusterConfig, ElectionConfig};
    pub use crate::directory::{NodeId, NodeIdentity, PeerDirectory};
    pub use crate::election::{ElectionEngine, ElectionSnapshot, Phase};
    pub use crate::error::{Error, Result};
    pub use crate::network::Messenger;
    pub use crate::node::ElectionNode;
    pub use crate::protocol::Message;
}
