//! Periodic state flushing.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::center::ConfigCenter;
use crate::storage::state_file::StateFile;

/// Writes the durable state every interval and once more on shutdown.
pub struct StateFlusher {
    center: ConfigCenter,
    file: StateFile,
    interval: Duration,
}

impl StateFlusher {
    pub fn new(center: ConfigCenter, file: StateFile, interval: Duration) -> Self {
        Self { center, file, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(path = ?self.file.path(), interval_secs = self.interval.as_secs(), "State flusher starting");

        let mut ticker = time::interval(self.interval);
        // First tick completes immediately; nothing new to save yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("State flusher received shutdown signal, final flush");
                    self.flush().await;
                    break;
                }
            }
        }
    }

    /// Snapshot the state in memory, then write it on the blocking pool.
    pub async fn flush(&self) {
        let state = self.center.export_state();
        let file = self.file.clone();
        match tokio::task::spawn_blocking(move || file.save(&state)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, path = ?self.file.path(), "Failed to flush state file");
            }
            Err(e) => tracing::error!(error = %e, "State flush task did not complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushConfig;

    #[tokio::test]
    async fn flush_writes_current_state() {
        let path = std::env::temp_dir().join(format!("config-center-flush-{}.json", std::process::id()));
        let center = ConfigCenter::new(PushConfig::default());
        center.catalog().create_application("shop".into(), "Shop").unwrap();

        let flusher = StateFlusher::new(center, StateFile::new(&path), Duration::from_secs(60));
        flusher.flush().await;

        let loaded = StateFile::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.applications.len(), 1);
        assert_eq!(loaded.applications[0].id.as_str(), "shop");
        let _ = std::fs::remove_file(path);
    }
}
