//! Push connection identity and bookkeeping.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and administration
//! - Hold per-connection liveness and subscription state
//! - Own the sending half of the connection's outbound queue

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::mpsc;

use crate::catalog::ApplicationId;
use crate::error::ConfigCenterError;
use crate::push::protocol::ServerMessage;
use crate::push::topics::Topic;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts both `conn-42` and `42`.
impl FromStr for ConnectionId {
    type Err = ConfigCenterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("conn-")
            .unwrap_or(s)
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ConfigCenterError::InvalidRequest(format!("invalid connection id: {s}")))
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A client's self-description, sent in its registration frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub application_id: ApplicationId,
    pub instance_id: String,
    pub instance_ip: String,
    pub client_version: String,
}

/// Public view of a live connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub connection_id: ConnectionId,
    pub application_id: ApplicationId,
    pub instance_id: String,
    pub instance_ip: String,
    pub client_version: String,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub subscribed_topics: BTreeSet<String>,
}

#[derive(Debug)]
pub(crate) struct Liveness {
    pub last_heartbeat: Instant,
    pub last_heartbeat_at: DateTime<Utc>,
    pub topics: BTreeSet<Topic>,
}

/// Registry entry for one connection.
#[derive(Debug)]
pub(crate) struct ClientConnection {
    pub id: ConnectionId,
    pub registration: Registration,
    pub connected_at: DateTime<Utc>,
    pub state: Mutex<Liveness>,
    pub outbound: mpsc::Sender<ServerMessage>,
}

impl ClientConnection {
    pub fn new(registration: Registration, outbound: mpsc::Sender<ServerMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: ConnectionId::new(),
            registration,
            connected_at: now,
            state: Mutex::new(Liveness {
                last_heartbeat: Instant::now(),
                last_heartbeat_at: now,
                topics: BTreeSet::new(),
            }),
            outbound,
        }
    }

    pub fn touch(&self) {
        let mut state = self.state.lock();
        state.last_heartbeat = Instant::now();
        state.last_heartbeat_at = Utc::now();
    }

    pub fn info(&self) -> ClientInfo {
        let state = self.state.lock();
        ClientInfo {
            connection_id: self.id,
            application_id: self.registration.application_id.clone(),
            instance_id: self.registration.instance_id.clone(),
            instance_ip: self.registration.instance_ip.clone(),
            client_version: self.registration.client_version.clone(),
            connected_at: self.connected_at,
            last_heartbeat_at: state.last_heartbeat_at,
            subscribed_topics: state.topics.iter().map(ToString::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_id_round_trips_through_text() {
        let id = ConnectionId::new();
        assert_eq!(id.to_string().parse::<ConnectionId>().unwrap(), id);
        assert_eq!("17".parse::<ConnectionId>().unwrap().as_u64(), 17);
        assert!("conn-x".parse::<ConnectionId>().is_err());
    }
}
