//! Election Engine
//!
//! Bully-algorithm state machine. Every handler takes the single state lock,
//! decides what to do, releases the lock, and only then talks to the
//! network. Delivery results come back through the same lock to maintain
//! the retry and inactive-peer bookkeeping.

use std::collections::BTreeMap;
use std::sync::Arc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::backoff;
use super::state::{ElectionState, FailureOutcome, Phase};
use crate::config::ElectionConfig;
use crate::directory::{NodeId, NodeIdentity, PeerDirectory};
use crate::network::Messenger;
use crate::protocol::Message;

/// Point-in-time view of a node's election state
#[derive(Debug, Clone, Serialize)]
pub struct ElectionSnapshot {
    pub node_id: NodeId,
    pub phase: Phase,
    pub leader_id: Option<NodeId>,
    pub is_leader: bool,
    pub leadership_confirmed: bool,
    pub millis_since_announcement: u64,
    pub inactive_peers: Vec<NodeId>,
    pub retry_counts: BTreeMap<NodeId, u32>,
    pub round: u64,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

/// What a heartbeat tick decided to do once the lock is released
enum TickAction {
    Announce(Vec<NodeId>),
    Reelect,
    Nothing,
}

/// Election engine for one node
pub struct ElectionEngine {
    /// This node's identity
    identity: NodeIdentity,
    /// The other members of the group
    directory: Arc<PeerDirectory>,
    /// Timing and failure policy
    config: ElectionConfig,
    /// The one lock every state access goes through
    state: Mutex<ElectionState>,
    /// Outbound transport
    messenger: Arc<dyn Messenger>,
    /// Cancelled when the node stops; pending timers are dropped
    stopped: CancellationToken,
}

impl ElectionEngine {
    /// Create a new engine in phase Idle with no leader
    pub fn new(
        identity: NodeIdentity,
        directory: Arc<PeerDirectory>,
        config: ElectionConfig,
        messenger: Arc<dyn Messenger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            directory,
            config,
            state: Mutex::new(ElectionState::new()),
            messenger,
            stopped: CancellationToken::new(),
        })
    }

    /// Stop the engine. Pending backoff and settle timers never fire.
    pub fn stop(&self) {
        self.stopped.cancel();
    }

    /// Token cancelled by [`stop`](Self::stop)
    pub fn stopped(&self) -> CancellationToken {
        self.stopped.clone()
    }

    /// This node's ID
    pub fn id(&self) -> NodeId {
        self.identity.id
    }

    /// This node's identity
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Election configuration
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Current phase
    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    /// Currently recognised leader
    pub async fn leader_id(&self) -> Option<NodeId> {
        self.state.lock().await.leader_id
    }

    /// Snapshot of the full state
    pub async fn snapshot(&self) -> ElectionSnapshot {
        let state = self.state.lock().await;
        ElectionSnapshot {
            node_id: self.identity.id,
            phase: state.phase,
            leader_id: state.leader_id,
            is_leader: state.phase == Phase::Leader,
            leadership_confirmed: state.phase == Phase::Leader && state.leadership_confirmed,
            millis_since_announcement: state.since_announcement().as_millis() as u64,
            inactive_peers: state.inactive_peers.iter().copied().collect(),
            retry_counts: state.retry_counts.clone(),
            round: state.round,
            observed_at: chrono::Utc::now(),
        }
    }

    /// Dispatch an inbound protocol message
    pub async fn handle(self: &Arc<Self>, message: Message) {
        if let Some(sender) = message.sender() {
            if sender != self.identity.id && !self.directory.contains(sender) {
                tracing::warn!("Ignoring {} from node {} outside the peer directory", message, sender);
                return;
            }
        }

        match message {
            Message::Election { sender } => self.on_election(sender).await,
            Message::Ok { sender } => self.on_ok(sender).await,
            Message::Leader { announcer } => self.on_leader(announcer).await,
            Message::Heartbeat => self.on_heartbeat().await,
        }
    }

    /// Start an election unless one is already running or a leader is held.
    pub async fn initiate_election(self: &Arc<Self>) {
        let self_id = self.identity.id;

        let (round, targets) = {
            let mut state = self.state.lock().await;
            if matches!(state.phase, Phase::Electing | Phase::AwaitingLeader | Phase::Leader) {
                tracing::debug!("Node {} not starting election: already {}", self_id, state.phase);
                return;
            }

            let round = state.begin_round();
            let targets: Vec<NodeId> = self
                .directory
                .higher_ids()
                .filter(|id| !state.is_inactive(*id))
                .collect();

            tracing::info!("Node {} initiating election (round {})", self_id, round);

            if targets.is_empty() {
                let announce = self.claim_leadership(&mut state);
                drop(state);
                self.announce_leadership(round, announce).await;
                return;
            }

            (round, targets)
        };

        backoff::arm(Arc::clone(self), round, self.config.election_backoff());
        self.broadcast(targets, Message::Election { sender: self_id }).await;
    }

    /// ELECTION from `sender`: lower nodes get an OK and trigger our own run.
    pub async fn on_election(self: &Arc<Self>, sender: NodeId) {
        let self_id = self.identity.id;

        if sender >= self_id {
            tracing::debug!("Node {} ignoring election message from node {}", self_id, sender);
            return;
        }

        tracing::info!("Node {} received election message from node {}", self_id, sender);

        let start_own = {
            let state = self.state.lock().await;
            state.phase != Phase::Electing && state.leader_id.is_none()
        };

        self.deliver(sender, Message::Ok { sender: self_id }).await;

        if start_own {
            self.initiate_election().await;
        }
    }

    /// OK from `sender`: a higher node is alive, so stop competing.
    pub async fn on_ok(&self, sender: NodeId) {
        let self_id = self.identity.id;
        let mut state = self.state.lock().await;

        if sender <= self_id {
            tracing::warn!("Node {} ignoring OK from lower node {}", self_id, sender);
            return;
        }
        if state.phase != Phase::Electing {
            tracing::debug!("Node {} ignoring OK from node {} while {}", self_id, sender, state.phase);
            return;
        }

        tracing::info!("Node {} received OK from node {}, stopping election", self_id, sender);
        state.set_phase(Phase::AwaitingLeader);
    }

    /// LEADER from `announcer`: adopt it unconditionally.
    pub async fn on_leader(&self, announcer: NodeId) {
        let self_id = self.identity.id;
        let mut state = self.state.lock().await;

        let phase = if announcer == self_id { Phase::Leader } else { Phase::Follower };
        if state.leader_id != Some(announcer) || state.phase != phase {
            tracing::info!("Node {} recognizes node {} as leader", self_id, announcer);
            state.leader_id = Some(announcer);
            state.set_phase(phase);
        } else {
            tracing::trace!("Node {} refreshed leader {}", self_id, announcer);
        }

        state.clear_failures();
        state.touch();
    }

    /// HEARTBEAT: refresh the follower timeout only.
    ///
    /// Ignored while no leader is known. Re-probes from any node arrive as
    /// HEARTBEAT and must not hold off an Idle node's election.
    pub async fn on_heartbeat(&self) {
        let mut state = self.state.lock().await;
        if state.leader_id.is_none() {
            tracing::trace!("Node {} ignoring heartbeat without a leader", self.identity.id);
            return;
        }
        state.touch();
    }

    /// Become leader and announce it to every active peer.
    pub async fn declare_leader(self: &Arc<Self>) {
        let (round, targets) = {
            let mut state = self.state.lock().await;
            let targets = self.claim_leadership(&mut state);
            (state.round, targets)
        };

        self.announce_leadership(round, targets).await;
    }

    /// Backoff deadline for `round`. Declares only if nothing disqualified us.
    pub(crate) async fn on_backoff_expired(self: &Arc<Self>, round: u64) {
        let targets = {
            let mut state = self.state.lock().await;
            if state.phase != Phase::Electing || state.round != round {
                tracing::debug!(
                    "Node {} backoff for round {} expired with no effect ({} in round {})",
                    self.identity.id,
                    round,
                    state.phase,
                    state.round
                );
                return;
            }

            tracing::info!("Node {} received no OK within the backoff window", self.identity.id);
            self.claim_leadership(&mut state)
        };

        self.announce_leadership(round, targets).await;
    }

    /// One heartbeat monitor period.
    ///
    /// The leader re-announces itself. A follower whose leader has gone quiet,
    /// or a node stuck waiting for a LEADER after an OK, starts a new election.
    pub async fn tick(self: &Arc<Self>, tick: u64) {
        let self_id = self.identity.id;

        let action = {
            let mut state = self.state.lock().await;
            match state.phase {
                Phase::Leader => TickAction::Announce(self.active_peers(&state)),
                Phase::Electing => TickAction::Nothing,
                Phase::AwaitingLeader => {
                    let waited = state.awaiting_since.map(|t| t.elapsed()).unwrap_or_default();
                    if waited > self.config.awaiting_leader_timeout() {
                        tracing::warn!(
                            "Node {} got no leader announcement {:?} after an OK; restarting election",
                            self_id,
                            waited
                        );
                        state.drop_leader();
                        TickAction::Reelect
                    } else {
                        TickAction::Nothing
                    }
                }
                Phase::Idle | Phase::Follower => {
                    if state.since_announcement() > self.config.follower_timeout() {
                        match state.leader_id {
                            Some(leader) => tracing::warn!(
                                "Node {} detected that leader node {} is inactive; starting new election",
                                self_id,
                                leader
                            ),
                            None => tracing::warn!("Node {} has no leader; starting election", self_id),
                        }
                        state.drop_leader();
                        TickAction::Reelect
                    } else {
                        TickAction::Nothing
                    }
                }
            }
        };

        match action {
            TickAction::Announce(targets) => {
                self.broadcast(targets, Message::Leader { announcer: self_id }).await
            }
            TickAction::Reelect => self.initiate_election().await,
            TickAction::Nothing => {}
        }

        let every = self.config.reprobe_interval_ticks;
        if every > 0 && tick % every == 0 {
            self.reprobe_inactive().await;
        }
    }

    /// Send HEARTBEAT to every inactive peer; a delivery reinstates it.
    ///
    /// A probed follower that knows a leader refreshes its follower timeout
    /// on receipt, so a low `reprobe_interval_ticks` on a non-leader can
    /// delay that follower's detection of a dead leader by up to one
    /// probe period.
    pub async fn reprobe_inactive(&self) {
        let inactive: Vec<NodeId> = {
            let state = self.state.lock().await;
            state.inactive_peers.iter().copied().collect()
        };

        if inactive.is_empty() {
            return;
        }

        tracing::debug!("Node {} re-probing inactive peers {:?}", self.identity.id, inactive);
        self.broadcast(inactive, Message::Heartbeat).await;
    }

    /// Mark self leader under the caller's lock; returns who to announce to
    fn claim_leadership(&self, state: &mut ElectionState) -> Vec<NodeId> {
        state.become_leader(self.identity.id);
        tracing::info!("Node {} is the new leader", self.identity.id);
        self.active_peers(state)
    }

    /// Broadcast LEADER and open the settle window
    async fn announce_leadership(self: &Arc<Self>, round: u64, targets: Vec<NodeId>) {
        backoff::settle(Arc::clone(self), round, self.config.settle_delay());
        self.broadcast(targets, Message::Leader { announcer: self.identity.id }).await;
    }

    /// End of the settle window opened in `round`
    pub(crate) async fn on_settled(&self, round: u64) {
        let mut state = self.state.lock().await;
        if state.phase == Phase::Leader && state.round == round {
            state.leadership_confirmed = true;
            tracing::info!("Node {} confirmed as leader", self.identity.id);
        }
    }

    fn active_peers(&self, state: &ElectionState) -> Vec<NodeId> {
        self.directory
            .ids()
            .filter(|id| !state.is_inactive(*id))
            .collect()
    }

    async fn broadcast(&self, targets: Vec<NodeId>, message: Message) {
        join_all(targets.into_iter().map(|target| self.deliver(target, message))).await;
    }

    /// Send one message and feed the result into the failure bookkeeping.
    async fn deliver(&self, target: NodeId, message: Message) -> bool {
        match self.messenger.send(target, message).await {
            Ok(()) => {
                let reinstated = self.state.lock().await.record_success(target);
                if reinstated {
                    tracing::info!("Node {} reinstated peer {}", self.identity.id, target);
                }
                true
            }
            Err(e) if e.is_transport() => {
                tracing::warn!("Node {} could not reach node {}: {}", self.identity.id, target, e);
                let outcome = self
                    .state
                    .lock()
                    .await
                    .record_failure(target, self.config.inactivity_threshold);
                if outcome == FailureOutcome::MarkedInactive {
                    tracing::warn!("Node {} marked peer {} inactive", self.identity.id, target);
                }
                false
            }
            Err(e) => {
                tracing::error!("Node {} failed to send {} to node {}: {}", self.identity.id, message, target, e);
                false
            }
        }
    }
}
