//! Connection registry and fan-out.
//!
//! # Responsibilities
//! - Register, track and drop client connections
//! - Index subscriptions by topic so fan-out never scans every connection
//! - Deliver best-effort, at-most-once messages through bounded queues
//! - Expire connections that stopped sending heartbeats
//!
//! # Design Decisions
//! - Delivery is `try_send`: a slow or gone client is a counted failure,
//!   never back-pressure on the publisher
//! - A connection matched through several topics gets one copy
//! - Nothing is queued for disconnected clients; they pull on reconnect

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::catalog::{ApplicationId, EnvironmentId};
use crate::config::PushConfig;
use crate::error::{ConfigCenterError, ConfigResult};
use crate::observability::metrics;
use crate::push::connection::{ClientConnection, ClientInfo, ConnectionId, Registration};
use crate::push::protocol::ServerMessage;
use crate::push::topics::Topic;
use crate::snapshots::{ConfigSnapshot, PublishListener};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub recipients: usize,
    pub delivered: u64,
    pub failed: u64,
}

impl std::ops::AddAssign for DeliveryReport {
    fn add_assign(&mut self, other: Self) {
        self.recipients += other.recipients;
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Per-application connection statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub application_id: ApplicationId,
    pub online_clients: usize,
    pub subscriptions: usize,
    pub delivered: u64,
    pub failed: u64,
    pub expired: u64,
}

#[derive(Debug, Default)]
struct AppCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
}

/// A freshly registered connection and the receiving end of its queue.
pub struct Session {
    pub connection_id: ConnectionId,
    pub outbound: mpsc::Receiver<ServerMessage>,
}

pub struct PushDistributor {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    topics: DashMap<Topic, HashSet<ConnectionId>>,
    counters: DashMap<ApplicationId, Arc<AppCounters>>,
    policy: ArcSwap<PushConfig>,
}

impl PushDistributor {
    pub fn new(policy: PushConfig) -> Self {
        Self {
            connections: DashMap::new(),
            topics: DashMap::new(),
            counters: DashMap::new(),
            policy: ArcSwap::from_pointee(policy),
        }
    }

    pub fn policy(&self) -> Arc<PushConfig> {
        self.policy.load_full()
    }

    /// Swap the liveness/queue policy. Existing queues keep their capacity.
    pub fn update_policy(&self, policy: PushConfig) {
        tracing::info!(
            heartbeat_interval_secs = policy.heartbeat_interval_secs,
            max_missed = policy.max_missed_heartbeats,
            "Push policy updated"
        );
        self.policy.store(Arc::new(policy));
    }

    fn counters(&self, app: &ApplicationId) -> Arc<AppCounters> {
        if let Some(existing) = self.counters.get(app) {
            return existing.value().clone();
        }
        self.counters.entry(app.clone()).or_default().value().clone()
    }

    pub fn register(&self, registration: Registration) -> ConfigResult<Session> {
        if registration.application_id.as_str().trim().is_empty() {
            return Err(ConfigCenterError::InvalidRequest("applicationId is required".into()));
        }
        if registration.instance_id.trim().is_empty() {
            return Err(ConfigCenterError::InvalidRequest("instanceId is required".into()));
        }

        let (tx, rx) = mpsc::channel(self.policy.load().queue_capacity.max(1));
        let connection = Arc::new(ClientConnection::new(registration, tx));
        let id = connection.id;

        tracing::info!(
            connection_id = %id,
            app_id = %connection.registration.application_id,
            instance_id = %connection.registration.instance_id,
            instance_ip = %connection.registration.instance_ip,
            client_version = %connection.registration.client_version,
            "Client registered"
        );
        self.connections.insert(id, connection);
        metrics::record_online_clients(self.connections.len());

        Ok(Session {
            connection_id: id,
            outbound: rx,
        })
    }

    pub fn subscribe(&self, id: ConnectionId, raw_topic: &str) -> ConfigResult<Topic> {
        let topic: Topic = raw_topic.parse()?;
        let connection = self.connection(id)?;
        if let Some(app) = topic.application_id() {
            if app != &connection.registration.application_id {
                return Err(ConfigCenterError::InvalidRequest(format!(
                    "{topic} belongs to another application than {}",
                    connection.registration.application_id
                )));
            }
        }

        connection.state.lock().topics.insert(topic.clone());
        self.topics.entry(topic.clone()).or_default().insert(id);

        // Lost a race with disconnect: do not leave a dangling index entry.
        if !self.connections.contains_key(&id) {
            self.unindex(id, std::iter::once(&topic));
            return Err(ConfigCenterError::not_found("connection", id));
        }

        tracing::debug!(connection_id = %id, topic = %topic, "Subscribed");
        Ok(topic)
    }

    pub fn heartbeat(&self, id: ConnectionId) -> ConfigResult<()> {
        self.connection(id)?.touch();
        tracing::trace!(connection_id = %id, "Heartbeat");
        Ok(())
    }

    /// Drop a connection and release its subscriptions.
    pub fn disconnect(&self, id: ConnectionId) -> ConfigResult<ClientInfo> {
        let (_, connection) = self
            .connections
            .remove(&id)
            .ok_or_else(|| ConfigCenterError::not_found("connection", id))?;

        let info = connection.info();
        let topics: Vec<Topic> = connection.state.lock().topics.iter().cloned().collect();
        self.unindex(id, topics.iter());
        metrics::record_online_clients(self.connections.len());

        tracing::info!(connection_id = %id, app_id = %info.application_id, "Client disconnected");
        Ok(info)
    }

    /// Tell the client why, then drop it.
    pub fn disconnect_with_reason(&self, id: ConnectionId, reason: &str) -> ConfigResult<ClientInfo> {
        let connection = self.connection(id)?;
        let _ = connection.outbound.try_send(ServerMessage::Disconnect {
            reason: reason.to_string(),
        });
        self.disconnect(id)
    }

    /// Disconnect every client, e.g. on shutdown.
    pub fn disconnect_all(&self, reason: &str) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|r| *r.key()).collect();
        ids.into_iter()
            .filter(|id| self.disconnect_with_reason(*id, reason).is_ok())
            .count()
    }

    fn unindex<'a>(&self, id: ConnectionId, topics: impl Iterator<Item = &'a Topic>) {
        for topic in topics {
            let now_empty = match self.topics.get_mut(topic) {
                Some(mut members) => {
                    members.remove(&id);
                    members.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.topics.remove_if(topic, |_, members| members.is_empty());
            }
        }
    }

    fn connection(&self, id: ConnectionId) -> ConfigResult<Arc<ClientConnection>> {
        self.connections
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ConfigCenterError::not_found("connection", id))
    }

    fn subscribers(&self, topics: &[Topic]) -> HashSet<ConnectionId> {
        let mut ids = HashSet::new();
        for topic in topics {
            if let Some(members) = self.topics.get(topic) {
                ids.extend(members.iter().copied());
            }
        }
        ids
    }

    fn deliver(&self, targets: impl IntoIterator<Item = ConnectionId>, message: &ServerMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for id in targets {
            let Some(connection) = self.connections.get(&id).map(|r| r.value().clone()) else {
                continue;
            };
            report.recipients += 1;
            let counters = self.counters(&connection.registration.application_id);

            match connection.outbound.try_send(message.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    report.failed += 1;
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    let err = ConfigCenterError::ConnectionLost(id.to_string());
                    tracing::debug!(connection_id = %id, error = %err, cause = %e, "Push delivery failed");
                }
            }
        }

        metrics::record_push_delivery("delivered", report.delivered);
        metrics::record_push_delivery("failed", report.failed);
        report
    }

    /// Deliver to every connection subscribed to the app or the app/env config topic.
    pub fn notify(&self, app: &ApplicationId, env: &EnvironmentId, message: &ServerMessage) -> DeliveryReport {
        let targets = self.subscribers(&[
            Topic::AppConfig(app.clone()),
            Topic::EnvConfig(app.clone(), env.clone()),
        ]);
        let report = self.deliver(targets, message);
        tracing::debug!(
            app_id = %app,
            env_id = %env,
            recipients = report.recipients,
            failed = report.failed,
            "Config update fanned out"
        );
        report
    }

    /// Version-only event on the application's notification topic.
    pub fn notify_change(&self, app: &ApplicationId, env: &EnvironmentId, version_number: u64) -> DeliveryReport {
        let targets = self.subscribers(&[Topic::AppNotifications(app.clone())]);
        self.deliver(
            targets,
            &ServerMessage::ConfigChangeNotification {
                application_id: app.clone(),
                environment_id: env.clone(),
                version_number,
                timestamp: Utc::now(),
            },
        )
    }

    /// Deliver to the instance topics of the given instance ids.
    pub fn push_to_instances(&self, instance_ids: &[String], message: &ServerMessage) -> DeliveryReport {
        let topics: Vec<Topic> = instance_ids.iter().cloned().map(Topic::InstanceConfig).collect();
        let targets = self.subscribers(&topics);
        self.deliver(targets, message)
    }

    /// Free-text message to every connection registered for `app`.
    pub fn message_application(&self, app: &ApplicationId, text: &str) -> DeliveryReport {
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|r| &r.value().registration.application_id == app)
            .map(|r| *r.key())
            .collect();
        tracing::info!(app_id = %app, recipients = targets.len(), "Messaging application");
        self.deliver(targets, &Self::text_message(text))
    }

    /// Free-text message on the instance topics of the given instance ids.
    pub fn message_instances(&self, instance_ids: &[String], text: &str) -> DeliveryReport {
        self.push_to_instances(instance_ids, &Self::text_message(text))
    }

    fn text_message(text: &str) -> ServerMessage {
        ServerMessage::Broadcast {
            message: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Deliver to every registered connection regardless of subscriptions.
    pub fn broadcast(&self, text: &str) -> DeliveryReport {
        let targets: Vec<ConnectionId> = self.connections.iter().map(|r| *r.key()).collect();
        tracing::info!(recipients = targets.len(), "Broadcasting message");
        self.deliver(targets, &Self::text_message(text))
    }

    /// Remove connections whose last heartbeat is older than the expiry window at `now`.
    pub fn sweep_expired_at(&self, now: Instant) -> Vec<ConnectionId> {
        let window = self.policy.load().expiry_window();
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|r| now.saturating_duration_since(r.value().state.lock().last_heartbeat) > window)
            .map(|r| *r.key())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            let Ok(connection) = self.connection(id) else { continue };
            let _ = connection.outbound.try_send(ServerMessage::Disconnect {
                reason: "heartbeat timeout".into(),
            });
            if let Ok(info) = self.disconnect(id) {
                self.counters(&info.application_id).expired.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(connection_id = %id, app_id = %info.application_id, "Connection expired: missed heartbeats");
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            metrics::record_connections_expired(removed.len() as u64);
        }
        removed
    }

    /// Live connections of an application, oldest first.
    pub fn online_clients(&self, app: &ApplicationId) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self
            .connections
            .iter()
            .filter(|r| &r.value().registration.application_id == app)
            .map(|r| r.value().info())
            .collect();
        clients.sort_by_key(|c| c.connection_id);
        clients
    }

    pub fn stats(&self, app: &ApplicationId) -> ConnectionStats {
        let clients = self.online_clients(app);
        let counters = self.counters(app);
        ConnectionStats {
            application_id: app.clone(),
            online_clients: clients.len(),
            subscriptions: clients.iter().map(|c| c.subscribed_topics.len()).sum(),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            expired: counters.expired.load(Ordering::Relaxed),
        }
    }

    pub fn total_online(&self) -> usize {
        self.connections.len()
    }

    /// Number of live connections per application.
    pub fn online_by_application(&self) -> HashMap<ApplicationId, usize> {
        let mut counts = HashMap::new();
        for entry in self.connections.iter() {
            *counts.entry(entry.value().registration.application_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl PublishListener for PushDistributor {
    fn on_published(&self, snapshot: &ConfigSnapshot) {
        let update = ServerMessage::ConfigUpdate {
            application_id: snapshot.application_id.clone(),
            environment_id: snapshot.environment_id.clone(),
            snapshot_id: snapshot.id,
            version_number: snapshot.snapshot_version_number,
            config: snapshot.values(),
            timestamp: snapshot.published_at.unwrap_or_else(Utc::now),
        };
        let report = self.notify(&snapshot.application_id, &snapshot.environment_id, &update);
        self.notify_change(
            &snapshot.application_id,
            &snapshot.environment_id,
            snapshot.snapshot_version_number,
        );
        tracing::info!(
            snapshot_id = snapshot.id,
            app_id = %snapshot.application_id,
            env_id = %snapshot.environment_id,
            delivered = report.delivered,
            failed = report.failed,
            "Published snapshot pushed"
        );
    }
}
