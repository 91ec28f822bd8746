//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Restore durable state before traffic is accepted
//! - Start background tasks (config watcher, state flusher, metrics)
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::center::ConfigCenter;
use crate::config::{ConfigWatcher, ServiceConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::storage::{StateFile, StateFlusher, StorageError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load state: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the service until a termination signal arrives.
pub async fn run(config: ServiceConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        heartbeat_interval_secs = config.push.heartbeat_interval_secs,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let center = ConfigCenter::new(config.push.clone());
    let shutdown = Shutdown::new();

    let mut flusher_task = None;
    if let Some(path) = &config.storage.state_path {
        let file = StateFile::new(path);
        if let Some(state) = file.load()? {
            center.restore_state(state);
        }
        let flusher = StateFlusher::new(
            center.clone(),
            file,
            Duration::from_secs(config.storage.flush_interval_secs),
        );
        flusher_task = Some(tokio::spawn(flusher.run(shutdown.subscribe())));
    }

    // The watcher handle must outlive the server for events to keep flowing.
    let (_watcher, config_updates) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    signals::spawn_signal_listener(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::with_center(config, center);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    if let Some(task) = flusher_task {
        let _ = task.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
