//! Heartbeat liveness monitor.
//!
//! # Responsibilities
//! - Periodically sweep connections that missed too many heartbeats
//! - Stop cleanly on the shutdown signal

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::time;

use crate::push::distributor::PushDistributor;

pub struct LivenessMonitor {
    distributor: Arc<PushDistributor>,
}

impl LivenessMonitor {
    pub fn new(distributor: Arc<PushDistributor>) -> Self {
        Self { distributor }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let policy = self.distributor.policy();
        tracing::info!(
            sweep_interval_secs = policy.sweep_interval_secs,
            expiry_window_secs = policy.expiry_window().as_secs(),
            "Liveness monitor starting"
        );

        loop {
            // Re-read every round so a hot-reloaded interval takes effect.
            let interval = self.distributor.policy().sweep_interval();
            tokio::select! {
                _ = time::sleep(interval) => {
                    let expired = self.distributor.sweep_expired_at(Instant::now());
                    if !expired.is_empty() {
                        tracing::info!(count = expired.len(), "Expired connections removed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Liveness monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
