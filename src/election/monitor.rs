//! Heartbeat Monitor
//!
//! Periodic driver for [`ElectionEngine::tick`]: the leader re-announces
//! itself each period, followers check the age of the last announcement.

use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::ElectionEngine;

/// Heartbeat monitor task
pub struct HeartbeatMonitor {
    engine: Arc<ElectionEngine>,
}

impl HeartbeatMonitor {
    /// Create a monitor for `engine`
    pub fn new(engine: Arc<ElectionEngine>) -> Self {
        Self { engine }
    }

    /// Tick until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let period = self.engine.config().heartbeat_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately
        ticker.tick().await;

        tracing::info!("Heartbeat monitor started (period {:?})", period);

        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick += 1;
                    self.engine.tick(tick).await;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Heartbeat monitor stopped");
    }
}
