//! Election State
//!
//! The mutable election state of one node. It is owned by the
//! [`ElectionEngine`](super::ElectionEngine) and only ever touched while the
//! engine's lock is held.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::directory::NodeId;

/// Election phase of this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No leader known and no election running
    Idle,
    /// ELECTION sent to higher peers, waiting for an OK or the backoff
    Electing,
    /// A higher peer answered OK; waiting for its LEADER announcement
    AwaitingLeader,
    /// Following a known leader
    Follower,
    /// This node is the leader
    Leader,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "IDLE"),
            Phase::Electing => write!(f, "ELECTING"),
            Phase::AwaitingLeader => write!(f, "AWAITING_LEADER"),
            Phase::Follower => write!(f, "FOLLOWER"),
            Phase::Leader => write!(f, "LEADER"),
        }
    }
}

/// Outcome of recording a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still within the retry budget
    Counted(u32),
    /// Threshold reached; the peer is now inactive
    MarkedInactive,
    /// The peer was already inactive
    AlreadyInactive,
}

/// Mutable election state of a single node
#[derive(Debug, Clone)]
pub struct ElectionState {
    /// Current phase
    pub phase: Phase,
    /// Recognised leader, if any
    pub leader_id: Option<NodeId>,
    /// Last LEADER or HEARTBEAT received
    pub last_announcement: Instant,
    /// When the node entered AwaitingLeader
    pub awaiting_since: Option<Instant>,
    /// Peers presumed unreachable, skipped by broadcasts
    pub inactive_peers: BTreeSet<NodeId>,
    /// Consecutive failed deliveries per peer
    pub retry_counts: BTreeMap<NodeId, u32>,
    /// Local election round, bumped each time an election starts
    pub round: u64,
    /// Set once the settle window after self-declaration has passed
    pub leadership_confirmed: bool,
}

impl ElectionState {
    /// Fresh state: Idle, no leader
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            leader_id: None,
            last_announcement: Instant::now(),
            awaiting_since: None,
            inactive_peers: BTreeSet::new(),
            retry_counts: BTreeMap::new(),
            round: 0,
            leadership_confirmed: false,
        }
    }

    /// Move to `phase`, dropping leader-only and await-only bookkeeping
    pub fn set_phase(&mut self, phase: Phase) {
        if phase != Phase::Leader {
            self.leadership_confirmed = false;
        }
        self.awaiting_since = match phase {
            Phase::AwaitingLeader => Some(Instant::now()),
            _ => None,
        };
        self.phase = phase;
    }

    /// Start a new election round. Returns the round number.
    pub fn begin_round(&mut self) -> u64 {
        self.round += 1;
        self.leader_id = None;
        self.set_phase(Phase::Electing);
        self.round
    }

    /// Record this node as leader
    pub fn become_leader(&mut self, self_id: NodeId) {
        self.leader_id = Some(self_id);
        self.set_phase(Phase::Leader);
    }

    /// Forget the current leader and go back to Idle
    pub fn drop_leader(&mut self) {
        self.leader_id = None;
        self.set_phase(Phase::Idle);
    }

    /// Refresh the announcement timestamp
    pub fn touch(&mut self) {
        self.last_announcement = Instant::now();
    }

    /// Time since the last LEADER or HEARTBEAT
    pub fn since_announcement(&self) -> std::time::Duration {
        self.last_announcement.elapsed()
    }

    /// True while an election is in progress for this node
    pub fn is_electing(&self) -> bool {
        matches!(self.phase, Phase::Electing | Phase::AwaitingLeader)
    }

    /// Check whether a peer is presumed unreachable
    pub fn is_inactive(&self, peer: NodeId) -> bool {
        self.inactive_peers.contains(&peer)
    }

    /// Count a failed delivery to `peer`
    pub fn record_failure(&mut self, peer: NodeId, threshold: u32) -> FailureOutcome {
        if self.inactive_peers.contains(&peer) {
            return FailureOutcome::AlreadyInactive;
        }

        let count = self.retry_counts.entry(peer).or_insert(0);
        *count += 1;

        if *count >= threshold {
            self.inactive_peers.insert(peer);
            FailureOutcome::MarkedInactive
        } else {
            FailureOutcome::Counted(*count)
        }
    }

    /// Reset a peer's retry count. Returns true if it was reinstated.
    pub fn record_success(&mut self, peer: NodeId) -> bool {
        self.retry_counts.remove(&peer);
        self.inactive_peers.remove(&peer)
    }

    /// Forget all failure bookkeeping
    pub fn clear_failures(&mut self) {
        self.inactive_peers.clear();
        self.retry_counts.clear();
    }
}

impl Default for ElectionState {
    fn default() -> Self {
        Self::new()
    }
}
