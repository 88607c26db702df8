//! Background task expiring stale trades.
//!
//! The sweeper ticks every `sweep_interval` and asks the coordinator to
//! expire whatever outlived the trade timeout. It runs for as long as its
//! [`SweeperHandle`] is told nothing else, and stops after the tick in
//! progress when [`SweeperHandle::stop`] is called.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::coordinator::TradeCoordinator;

/// Shortest period the sweeper ticks at. `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

pub struct ExpirySweeper;

impl ExpirySweeper {
    /// Spawns the sweep loop for `coordinator`.
    pub fn start(coordinator: Arc<TradeCoordinator>) -> SweeperHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(Self::run(coordinator, rx));
        SweeperHandle { shutdown, task }
    }

    async fn run(coordinator: Arc<TradeCoordinator>, mut shutdown: watch::Receiver<bool>) {
        let configured = coordinator.config().sweep_interval;
        let period = configured.max(MIN_SWEEP_INTERVAL);
        if period != configured {
            warn!(node = coordinator.node_id(), "sweep interval of zero raised to 1ms");
        }
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(node = coordinator.node_id(), period_ms = period.as_millis() as u64, "expiry sweeper starting");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(node = coordinator.node_id(), "expiry sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let expired = coordinator.sweep_expired(Utc::now()).await;
                    if !expired.is_empty() {
                        debug!(count = expired.len(), "expired stale trades");
                    }
                }
            }
        }
    }
}

/// Stops the sweeper it was returned with.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "expiry sweeper task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
