//! Client side of the push wire protocol.
//!
//! Mirrors the server's frames with plain string identifiers so the SDK does
//! not depend on the server crate. Unknown fields are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    ClientRegistration {
        application_id: String,
        instance_id: String,
        instance_ip: String,
        client_version: String,
    },
    Subscribe {
        topic: String,
    },
    Heartbeat,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ConnectSuccess {
        connection_id: String,
        heartbeat_interval_secs: u64,
    },
    Subscribed {
        topic: String,
    },
    HeartbeatAck,
    #[serde(rename_all = "camelCase")]
    ConfigUpdate {
        application_id: String,
        environment_id: String,
        snapshot_id: u64,
        version_number: u64,
        config: BTreeMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    ConfigChangeNotification {
        application_id: String,
        environment_id: String,
        version_number: u64,
    },
    Broadcast {
        message: String,
    },
    Disconnect {
        reason: String,
    },
    Error {
        message: String,
    },
}

/// The four topics a session subscribes to after registering.
pub fn session_topics(application_id: &str, environment_id: &str, instance_id: &str) -> [String; 4] {
    [
        format!("app/{application_id}/config"),
        format!("app/{application_id}/env/{environment_id}/config"),
        format!("instance/{instance_id}/config"),
        format!("app/{application_id}/notifications"),
    ]
}
