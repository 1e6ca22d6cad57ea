//! Peer Directory
//!
//! Static mapping from node identity to network endpoint. Every node is
//! started with the same view of the group, and the mapping never changes
//! while the process runs.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numeric node identity. Higher ids win elections.
pub type NodeId = u64;

/// A node's identity and the address it listens on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Unique node identifier
    pub id: NodeId,
    /// Endpoint (host:port)
    #[serde(alias = "address")]
    pub endpoint: String,
}

impl NodeIdentity {
    /// Create a new identity
    pub fn new(id: NodeId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({})", self.id, self.endpoint)
    }
}

/// Read-only directory of the other members of the group
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    /// This node's ID (never present in `peers`)
    self_id: NodeId,
    /// Peer id -> endpoint, ordered by id
    peers: BTreeMap<NodeId, String>,
}

impl PeerDirectory {
    /// Build a directory for `self_id` from the given peers.
    ///
    /// Fails if a peer reuses `self_id` or two peers share an id.
    pub fn new(self_id: NodeId, peers: impl IntoIterator<Item = NodeIdentity>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for peer in peers {
            if peer.id == self_id {
                return Err(Error::Config(format!(
                    "peer {} has the same id as this node",
                    peer.endpoint
                )));
            }
            if peer.endpoint.is_empty() {
                return Err(Error::Config(format!("peer {} has an empty endpoint", peer.id)));
            }
            if let Some(existing) = map.insert(peer.id, peer.endpoint) {
                return Err(Error::Config(format!(
                    "duplicate peer id {} (already mapped to {})",
                    peer.id, existing
                )));
            }
        }

        Ok(Self { self_id, peers: map })
    }

    /// Look up a peer's endpoint
    pub fn endpoint(&self, id: NodeId) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }

    /// Check whether `id` is a known peer
    pub fn contains(&self, id: NodeId) -> bool {
        self.peers.contains_key(&id)
    }

    /// All peer ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.keys().copied()
    }

    /// Peer ids with a higher election priority than this node
    pub fn higher_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers
            .range((Bound::Excluded(self.self_id), Bound::Unbounded))
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(self_id: NodeId, ids: &[NodeId]) -> PeerDirectory {
        PeerDirectory::new(
            self_id,
            ids.iter()
                .map(|id| NodeIdentity::new(*id, format!("127.0.0.1:{}", 9000 + id))),
        )
        .unwrap()
    }

    #[test]
    fn test_higher_ids_compare_by_id_not_endpoint() {
        // Endpoints deliberately out of order with respect to ids
        let dir = PeerDirectory::new(
            5,
            vec![
                NodeIdentity::new(9, "127.0.0.1:7001"),
                NodeIdentity::new(2, "127.0.0.1:7999"),
                NodeIdentity::new(7, "127.0.0.1:7500"),
            ],
        )
        .unwrap();

        let higher: Vec<NodeId> = dir.higher_ids().collect();
        assert_eq!(higher, vec![7, 9]);
        assert_eq!(dir.endpoint(2), Some("127.0.0.1:7999"));
    }

    #[test]
    fn test_highest_node_has_no_higher_peers() {
        let dir = directory(3, &[1, 2]);
        assert_eq!(dir.higher_ids().count(), 0);
        assert_eq!(dir.ids().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_rejects_self_and_duplicates() {
        let err = PeerDirectory::new(1, vec![NodeIdentity::new(1, "127.0.0.1:1")]);
        assert!(matches!(err, Err(Error::Config(_))));

        let err = PeerDirectory::new(
            1,
            vec![
                NodeIdentity::new(2, "127.0.0.1:2"),
                NodeIdentity::new(2, "127.0.0.1:3"),
            ],
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
