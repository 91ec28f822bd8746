//! Configuration file watcher for hot reload.
//!
//! Only the `[push]` section is applied live. A reload that changes any other
//! section is logged as requiring a restart and otherwise ignored; a reload
//! that leaves `[push]` untouched is not forwarded at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServiceConfig;

/// What a reloaded file changes relative to the running configuration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReloadPlan {
    pub push_changed: bool,
    /// Sections that changed but only take effect after a restart.
    pub restart_required: Vec<&'static str>,
}

pub fn plan_reload(current: &ServiceConfig, next: &ServiceConfig) -> ReloadPlan {
    let mut restart_required = Vec::new();
    if current.listener.bind_address != next.listener.bind_address
        || current.listener.max_body_bytes != next.listener.max_body_bytes
    {
        restart_required.push("listener");
    }
    if current.timeouts.request_secs != next.timeouts.request_secs {
        restart_required.push("timeouts");
    }
    if current.storage.state_path != next.storage.state_path
        || current.storage.flush_interval_secs != next.storage.flush_interval_secs
    {
        restart_required.push("storage");
    }
    if current.observability.log_level != next.observability.log_level
        || current.observability.json_logs != next.observability.json_logs
        || current.observability.metrics_enabled != next.observability.metrics_enabled
        || current.observability.metrics_address != next.observability.metrics_address
    {
        restart_required.push("observability");
    }
    if current.admin.enabled != next.admin.enabled || current.admin.api_key != next.admin.api_key {
        restart_required.push("admin");
    }

    ReloadPlan {
        push_changed: current.push != next.push,
        restart_required,
    }
}

/// Watches the config file and forwards push-policy changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: Arc<Mutex<ServiceConfig>>,
    update_tx: mpsc::UnboundedSender<ServiceConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver the server reload loop drains.
    pub fn new(path: &Path, running: ServiceConfig) -> (Self, mpsc::UnboundedReceiver<ServiceConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                current: Arc::new(Mutex::new(running)),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, current, update_tx } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let next = match load_config(&path) {
                        Ok(next) => next,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            return;
                        }
                    };

                    let mut running = current.lock();
                    let plan = plan_reload(&running, &next);
                    if !plan.restart_required.is_empty() {
                        tracing::warn!(sections = ?plan.restart_required, "Config sections changed that need a restart");
                    }
                    if plan.push_changed {
                        tracing::info!(
                            heartbeat_interval_secs = next.push.heartbeat_interval_secs,
                            max_missed_heartbeats = next.push.max_missed_heartbeats,
                            "Push policy reloaded"
                        );
                        running.push = next.push.clone();
                        let _ = update_tx.send(next);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}
