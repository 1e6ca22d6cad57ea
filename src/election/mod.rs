//! Leader Election
//!
//! Bully-algorithm election and failure detection: the live node with the
//! highest id becomes leader, announces itself every heartbeat period, and
//! followers re-elect when the announcements stop.

mod state;
mod engine;
mod backoff;
mod monitor;

pub use state::{ElectionState, FailureOutcome, Phase};
pub use engine::{ElectionEngine, ElectionSnapshot};
pub use monitor::HeartbeatMonitor;
