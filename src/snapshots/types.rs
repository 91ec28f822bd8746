//! Snapshot types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{ApplicationId, EnvironmentId, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    /// Draft, not yet active.
    Staged,
    /// The active snapshot of its scope.
    Published,
    /// Formerly published, retained as history.
    Superseded,
    /// A staged snapshot replaced before it was published.
    Discarded,
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SnapshotStatus::Staged => "staged",
            SnapshotStatus::Published => "published",
            SnapshotStatus::Superseded => "superseded",
            SnapshotStatus::Discarded => "discarded",
        };
        f.write_str(s)
    }
}

/// One frozen entry. `value` is `None` for a null placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub key: String,
    pub value: Option<String>,
}

impl SnapshotItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// Immutable point-in-time configuration bundle.
///
/// Only `status` and the publish stamps change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub id: u64,
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
    /// Strictly increasing within the scope.
    pub snapshot_version_number: u64,
    pub status: SnapshotStatus,
    pub items: Vec<SnapshotItem>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_by: Option<String>,
    /// Scope version number at freeze time.
    pub source_version: u64,
}

impl ConfigSnapshot {
    pub fn scope(&self) -> Scope {
        Scope {
            application_id: self.application_id.clone(),
            environment_id: self.environment_id.clone(),
        }
    }

    /// Items as a map. On duplicate keys the last entry wins.
    pub fn item_map(&self) -> BTreeMap<String, Option<String>> {
        self.items
            .iter()
            .map(|item| (item.key.clone(), item.value.clone()))
            .collect()
    }

    /// Concrete values only, as delivered to clients.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.items
            .iter()
            .filter_map(|item| item.value.clone().map(|v| (item.key.clone(), v)))
            .collect()
    }
}

/// Caller-supplied metadata for a new staged snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub author: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatistics {
    pub total_snapshots: usize,
    pub staged_snapshots: usize,
    pub published_snapshots: usize,
    pub superseded_snapshots: usize,
    pub discarded_snapshots: usize,
    pub latest_published_version: Option<u64>,
    pub latest_published_name: Option<String>,
}
