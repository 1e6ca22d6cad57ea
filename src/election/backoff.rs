//! Election Timers
//!
//! One-shot delayed actions. An OK never cancels a timer: each callback
//! re-reads the phase and round under the engine lock when it fires, and
//! does nothing if the election it was armed for is over. Timers are only
//! dropped when the engine itself stops.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::ElectionEngine;

/// Arm the election backoff for `round`.
///
/// When it fires while the node is still electing in the same round, the
/// node declares itself leader.
pub fn arm(engine: Arc<ElectionEngine>, round: u64, delay: Duration) -> JoinHandle<()> {
    let stopped = engine.stopped();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => engine.on_backoff_expired(round).await,
            _ = stopped.cancelled() => {}
        }
    })
}

/// Open the settle window after a self-declaration in `round`.
pub fn settle(engine: Arc<ElectionEngine>, round: u64, delay: Duration) -> JoinHandle<()> {
    let stopped = engine.stopped();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => engine.on_settled(round).await,
            _ = stopped.cancelled() => {}
        }
    })
}
