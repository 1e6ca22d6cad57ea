//! Bully Election Configuration
//!
//! This module provides configuration structures for an election node.
//! Values come from an optional TOML file and are overridden by the
//! command line.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::directory::{NodeId, NodeIdentity, PeerDirectory};
use crate::error::{Error, Result};

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Election timing and failure policy
    #[serde(default)]
    pub election: ElectionConfig,

    /// Outbound transport limits
    #[serde(default)]
    pub transport: TransportConfig,

    /// Status API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique node identifier (higher wins elections)
    pub id: NodeId,

    /// Address to bind for election traffic
    pub bind_address: String,

    /// The other members of the group
    #[serde(default)]
    pub peers: Vec<NodeIdentity>,
}

/// Election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Heartbeat monitor period in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which a follower presumes the leader dead
    #[serde(default = "default_follower_timeout_ms")]
    pub follower_timeout_ms: u64,

    /// How long an election waits for an OK before self-declaring
    #[serde(default = "default_election_backoff_ms")]
    pub election_backoff_ms: u64,

    /// Confirmation window after declaring leadership
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Consecutive failed sends before a peer is marked inactive
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold: u32,

    /// Monitor ticks between re-probes of inactive peers (0 = never)
    #[serde(default = "default_reprobe_interval_ticks")]
    pub reprobe_interval_ticks: u64,

    /// How long to wait for a LEADER after an OK (defaults to the backoff)
    #[serde(default)]
    pub awaiting_leader_timeout_ms: Option<u64>,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Write timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Longest inbound line accepted by the listener
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP status API
    #[serde(default)]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_heartbeat_interval_ms() -> u64 {
    3000
}

fn default_follower_timeout_ms() -> u64 {
    10000
}

fn default_election_backoff_ms() -> u64 {
    15000
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_inactivity_threshold() -> u32 {
    3
}

fn default_reprobe_interval_ticks() -> u64 {
    5
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_max_line_bytes() -> usize {
    256
}

fn default_api_address() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            follower_timeout_ms: default_follower_timeout_ms(),
            election_backoff_ms: default_election_backoff_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            inactivity_threshold: default_inactivity_threshold(),
            reprobe_interval_ticks: default_reprobe_interval_ticks(),
            awaiting_leader_timeout_ms: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_api_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ElectionConfig {
    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get follower timeout as Duration
    pub fn follower_timeout(&self) -> Duration {
        Duration::from_millis(self.follower_timeout_ms)
    }

    /// Get election backoff as Duration
    pub fn election_backoff(&self) -> Duration {
        Duration::from_millis(self.election_backoff_ms)
    }

    /// Get settle delay as Duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Get the AwaitingLeader deadline as Duration
    pub fn awaiting_leader_timeout(&self) -> Duration {
        Duration::from_millis(
            self.awaiting_leader_timeout_ms
                .unwrap_or(self.election_backoff_ms),
        )
    }

    /// Validate timing relationships
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::Config("election.heartbeat_interval_ms must be positive".into()));
        }
        if self.election_backoff_ms == 0 {
            return Err(Error::Config("election.election_backoff_ms must be positive".into()));
        }
        if self.follower_timeout_ms <= self.heartbeat_interval_ms {
            return Err(Error::Config(format!(
                "election.follower_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.follower_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.inactivity_threshold == 0 {
            return Err(Error::Config("election.inactivity_threshold must be at least 1".into()));
        }
        Ok(())
    }
}

impl TransportConfig {
    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get write timeout as Duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl ClusterConfig {
    /// Build a configuration with defaults for everything but the node section
    pub fn new(id: NodeId, bind_address: impl Into<String>, peers: Vec<NodeIdentity>) -> Self {
        Self {
            node: NodeConfig {
                id,
                bind_address: bind_address.into(),
                peers,
            },
            election: ElectionConfig::default(),
            transport: TransportConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Read a TOML file without validating it.
    ///
    /// Used when the command line supplies the node section afterwards.
    pub fn read_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClusterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.bind_address.is_empty() {
            return Err(Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.node.peers.is_empty() {
            return Err(Error::Config("at least one peer is required".into()));
        }

        // Directory construction rejects self-references and duplicate ids
        self.peer_directory()?;
        self.election.validate()?;

        if self.transport.connect_timeout_ms == 0 || self.transport.write_timeout_ms == 0 {
            return Err(Error::Config("transport timeouts must be positive".into()));
        }

        Ok(())
    }

    /// This node's identity
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.node.id, self.node.bind_address.clone())
    }

    /// Build the peer directory from the configured peers
    pub fn peer_directory(&self) -> Result<PeerDirectory> {
        PeerDirectory::new(self.node.id, self.node.peers.iter().cloned())
    }
}

/// Parse the peer arguments of the command line.
///
/// Each argument is `ID=HOST:PORT`, `ID=PORT`, or a bare `PORT`. Bare ports
/// are numbered by their 1-based position `i` among all arguments:
///
/// - If one of them is `listen_port`, the list names the whole group. The
///   port at position `i` belongs to node `i`, and `listen_port` must sit at
///   position `self_id`; that entry is skipped.
/// - Otherwise the list names only the other nodes, and positions count
///   past `self_id`: with `self_id = 2`, ports at positions 1 and 2 belong
///   to nodes 1 and 3.
pub fn parse_peer_args(
    self_id: NodeId,
    host: &str,
    listen_port: u16,
    args: &[String],
) -> Result<Vec<NodeIdentity>> {
    let mut explicit = Vec::new();
    let mut bare = Vec::new();

    for (index, arg) in args.iter().enumerate() {
        let arg = arg.trim();
        match arg.split_once('=') {
            Some((id, endpoint)) => {
                let id: NodeId = id
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid peer id in {:?}", arg)))?;
                let endpoint = endpoint.trim();
                let endpoint = if endpoint.contains(':') {
                    endpoint.to_string()
                } else {
                    format!("{}:{}", host, parse_port(endpoint)?)
                };
                explicit.push(NodeIdentity::new(id, endpoint));
            }
            None => bare.push((index as NodeId + 1, parse_port(arg)?)),
        }
    }

    let lists_self = bare.iter().any(|(_, port)| *port == listen_port);
    let mut peers = explicit;

    for (position, port) in bare {
        let id = if lists_self {
            if port == listen_port {
                if position != self_id {
                    return Err(Error::Config(format!(
                        "listen port {} is peer #{} but this node's id is {}",
                        listen_port, position, self_id
                    )));
                }
                continue;
            }
            if position == self_id {
                return Err(Error::Config(format!(
                    "peer #{} must be this node's listen port {}, got {}",
                    position, listen_port, port
                )));
            }
            position
        } else if position < self_id {
            position
        } else {
            position + 1
        };
        peers.push(NodeIdentity::new(id, format!("{}:{}", host, port)));
    }

    if peers.is_empty() {
        return Err(Error::Config("at least one peer is required".into()));
    }

    Ok(peers)
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::Config(format!("invalid port {:?}", raw))),
        Ok(port) => Ok(port),
    }
}
