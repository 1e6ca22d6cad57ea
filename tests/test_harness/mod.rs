//! Test harness for multi-node election tests.
//!
//! `SimCluster` wires engines together through an in-memory network and is
//! meant for paused-time tests. `TcpCluster` runs full nodes on loopback.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use bully_election::election::HeartbeatMonitor;
use bully_election::network::NetworkServer;
use bully_election::prelude::*;

/// Timings short enough for tests, with the production ratios kept
pub fn fast_election_config() -> ElectionConfig {
    ElectionConfig {
        heartbeat_interval_ms: 100,
        follower_timeout_ms: 400,
        election_backoff_ms: 500,
        settle_delay_ms: 50,
        inactivity_threshold: 3,
        reprobe_interval_ticks: 5,
        awaiting_leader_timeout_ms: None,
    }
}

fn endpoint(id: NodeId) -> String {
    format!("sim-node-{}", id)
}

/// In-memory network shared by every simulated node
#[derive(Default)]
pub struct SimNetwork {
    engines: Mutex<HashMap<NodeId, Weak<ElectionEngine>>>,
    down: Mutex<HashSet<NodeId>>,
    delivered: Mutex<Vec<(NodeId, NodeId, Message)>>,
}

impl SimNetwork {
    fn is_down(&self, id: NodeId) -> bool {
        self.down.lock().unwrap().contains(&id)
    }

    /// Every message delivered so far as (from, to, message)
    pub fn delivered(&self) -> Vec<(NodeId, NodeId, Message)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn clear_delivered(&self) {
        self.delivered.lock().unwrap().clear();
    }
}

/// Messenger of one simulated node
struct SimMessenger {
    owner: NodeId,
    network: Arc<SimNetwork>,
}

#[async_trait]
impl Messenger for SimMessenger {
    async fn send(&self, target: NodeId, message: Message) -> Result<()> {
        let refused = || Error::ConnectionFailed {
            address: endpoint(target),
            reason: "connection refused".into(),
        };

        if self.network.is_down(self.owner) || self.network.is_down(target) {
            return Err(refused());
        }

        let engine = self
            .network
            .engines
            .lock()
            .unwrap()
            .get(&target)
            .and_then(Weak::upgrade)
            .ok_or_else(refused)?;

        self.network
            .delivered
            .lock()
            .unwrap()
            .push((self.owner, target, message));

        // The receiver handles the line on its own task, like a real listener
        tokio::spawn(async move {
            engine.handle(message).await;
        });
        Ok(())
    }
}

struct SimNode {
    engine: Arc<ElectionEngine>,
    monitor: CancellationToken,
}

/// A group of engines connected by a [`SimNetwork`]
pub struct SimCluster {
    size: u64,
    config: ElectionConfig,
    network: Arc<SimNetwork>,
    nodes: BTreeMap<NodeId, SimNode>,
}

impl SimCluster {
    /// Create nodes `1..=size` without starting any elections
    pub fn new(size: u64, config: ElectionConfig) -> Self {
        let mut cluster = Self {
            size,
            config,
            network: Arc::new(SimNetwork::default()),
            nodes: BTreeMap::new(),
        };
        for id in 1..=size {
            cluster.spawn_node(id);
        }
        cluster
    }

    fn spawn_node(&mut self, id: NodeId) {
        let peers = (1..=self.size)
            .filter(|peer| *peer != id)
            .map(|peer| NodeIdentity::new(peer, endpoint(peer)));
        let directory = PeerDirectory::new(id, peers).unwrap();
        let messenger = Arc::new(SimMessenger {
            owner: id,
            network: Arc::clone(&self.network),
        });
        let engine = ElectionEngine::new(
            NodeIdentity::new(id, endpoint(id)),
            Arc::new(directory),
            self.config.clone(),
            messenger,
        );

        self.network
            .engines
            .lock()
            .unwrap()
            .insert(id, Arc::downgrade(&engine));

        let monitor = CancellationToken::new();
        tokio::spawn(HeartbeatMonitor::new(Arc::clone(&engine)).run(monitor.clone()));

        self.nodes.insert(id, SimNode { engine, monitor });
    }

    /// Start an election on every live node at once
    pub fn start_all(&self) {
        for id in self.live_ids() {
            self.start(id);
        }
    }

    /// Start an election on one node
    pub fn start(&self, id: NodeId) {
        let engine = Arc::clone(self.engine(id));
        tokio::spawn(async move {
            engine.initiate_election().await;
        });
    }

    pub fn network(&self) -> &Arc<SimNetwork> {
        &self.network
    }

    pub fn engine(&self, id: NodeId) -> &Arc<ElectionEngine> {
        &self.nodes[&id].engine
    }

    /// Crash a node: it stops ticking and every connection to it is refused
    pub fn kill(&mut self, id: NodeId) {
        self.network.down.lock().unwrap().insert(id);
        if let Some(node) = self.nodes.remove(&id) {
            node.monitor.cancel();
            node.engine.stop();
        }
    }

    /// Restart a crashed node with fresh state and start its election
    pub fn revive(&mut self, id: NodeId) {
        self.network.down.lock().unwrap().remove(&id);
        self.spawn_node(id);
        self.start(id);
    }

    pub fn live_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Live nodes currently in phase Leader
    pub async fn leaders(&self) -> Vec<NodeId> {
        let mut leaders = Vec::new();
        for (id, node) in &self.nodes {
            if node.engine.phase().await == Phase::Leader {
                leaders.push(*id);
            }
        }
        leaders
    }

    /// True once every live node recognises `leader` and only it leads
    pub async fn agrees_on(&self, leader: NodeId) -> bool {
        for (id, node) in &self.nodes {
            let expected = if *id == leader { Phase::Leader } else { Phase::Follower };
            let snapshot = node.engine.snapshot().await;
            if snapshot.phase != expected || snapshot.leader_id != Some(leader) {
                return false;
            }
        }
        true
    }

    /// Poll until every live node agrees on `leader` or `timeout` passes
    pub async fn wait_for_agreement(&self, leader: NodeId, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.agrees_on(leader).await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.agrees_on(leader).await
    }

    pub fn shutdown(&mut self) {
        for id in self.live_ids() {
            self.kill(id);
        }
    }
}

/// Full nodes talking TCP on loopback
pub struct TcpCluster {
    nodes: BTreeMap<NodeId, ElectionNode>,
}

impl TcpCluster {
    /// Start nodes `1..=size` on ephemeral loopback ports
    pub async fn new(size: u64) -> Self {
        let mut servers = BTreeMap::new();
        let mut addresses = BTreeMap::new();
        for id in 1..=size {
            let server = NetworkServer::bind("127.0.0.1:0", &Default::default())
                .await
                .unwrap();
            addresses.insert(id, server.local_addr().unwrap().to_string());
            servers.insert(id, server);
        }

        let mut nodes = BTreeMap::new();
        for (id, server) in servers {
            let peers = addresses
                .iter()
                .filter(|(peer, _)| **peer != id)
                .map(|(peer, address)| NodeIdentity::new(*peer, address.clone()))
                .collect();
            let mut config = ClusterConfig::new(id, addresses[&id].clone(), peers);
            config.election = fast_election_config();

            let node = ElectionNode::start_with_listener(config, server).await.unwrap();
            nodes.insert(id, node);
        }

        Self { nodes }
    }

    pub fn node(&self, id: NodeId) -> Option<&ElectionNode> {
        self.nodes.get(&id)
    }

    /// Stop one node. Returns false if it was not running.
    pub async fn shutdown_node(&mut self, id: NodeId) -> bool {
        match self.nodes.remove(&id) {
            Some(node) => {
                node.shutdown().await;
                true
            }
            None => false,
        }
    }

    async fn agreed_leader(&self) -> Option<NodeId> {
        let mut agreed = None;
        for (id, node) in &self.nodes {
            let snapshot = node.engine().snapshot().await;
            let leader = snapshot.leader_id?;
            let expected = if leader == *id { Phase::Leader } else { Phase::Follower };
            if snapshot.phase != expected || agreed.is_some_and(|seen| seen != leader) {
                return None;
            }
            agreed = Some(leader);
        }
        agreed
    }

    /// Wait until every running node recognises the same leader
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<NodeId> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if let Some(leader) = self.agreed_leader().await {
                return Some(leader);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        None
    }

    /// Wait until every running node recognises a leader other than `old_leader`
    pub async fn wait_for_new_leader(&self, old_leader: NodeId, timeout: Duration) -> Option<NodeId> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match self.agreed_leader().await {
                Some(leader) if leader != old_leader => return Some(leader),
                _ => tokio::time::sleep(Duration::from_millis(25)).await,
            }
        }
        None
    }

    pub async fn shutdown(self) {
        for (_, node) in self.nodes {
            node.shutdown().await;
        }
    }
}
