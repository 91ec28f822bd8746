//! Version history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{ApplicationId, EnvironmentId, Scope};

/// Kind of mutation recorded by a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Immutable record of one configuration-item mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVersion {
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
    pub key: String,
    /// Strictly increasing per scope, not per key.
    pub version_number: u64,
    /// `None` for deletions.
    pub value: Option<String>,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    pub author: String,
}

impl ConfigVersion {
    pub fn scope(&self) -> Scope {
        Scope {
            application_id: self.application_id.clone(),
            environment_id: self.environment_id.clone(),
        }
    }
}

/// Current value of a key in one environment, projected from its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigItem {
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
    pub key: String,
    pub value: String,
    pub current_version_number: u64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// A write request against a scope.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub key: String,
    pub value: Option<String>,
    pub change_type: ChangeType,
    pub author: String,
}
