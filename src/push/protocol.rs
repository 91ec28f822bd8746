//! Push wire protocol.
//!
//! JSON text frames over WebSocket. The `type` tag is SCREAMING_SNAKE_CASE,
//! fields are camelCase:
//!
//! ```text
//! → {"type":"CLIENT_REGISTRATION","applicationId":"shop","instanceId":"i-1",...}
//! ← {"type":"CONNECT_SUCCESS","connectionId":"conn-7","heartbeatIntervalSecs":30,...}
//! → {"type":"SUBSCRIBE","topic":"app/shop/env/prod/config"}
//! ← {"type":"SUBSCRIBED","topic":"app/shop/env/prod/config"}
//! → {"type":"HEARTBEAT"}
//! ← {"type":"HEARTBEAT_ACK","serverTime":"..."}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{ApplicationId, EnvironmentId};

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    ClientRegistration {
        application_id: ApplicationId,
        instance_id: String,
        #[serde(default)]
        instance_ip: String,
        #[serde(default)]
        client_version: String,
    },
    Subscribe {
        topic: String,
    },
    Heartbeat,
    Disconnect,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ConnectSuccess {
        connection_id: String,
        heartbeat_interval_secs: u64,
        server_time: DateTime<Utc>,
    },
    Subscribed {
        topic: String,
    },
    #[serde(rename_all = "camelCase")]
    HeartbeatAck {
        server_time: DateTime<Utc>,
    },
    /// Full replacement of a scope's configuration.
    #[serde(rename_all = "camelCase")]
    ConfigUpdate {
        application_id: ApplicationId,
        environment_id: EnvironmentId,
        snapshot_id: u64,
        version_number: u64,
        config: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    },
    /// Version-only event; receivers pull the configuration themselves.
    #[serde(rename_all = "camelCase")]
    ConfigChangeNotification {
        application_id: ApplicationId,
        environment_id: EnvironmentId,
        version_number: u64,
        timestamp: DateTime<Utc>,
    },
    Broadcast {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Disconnect {
        reason: String,
    },
    Error {
        message: String,
    },
}
