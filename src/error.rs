//! Domain error taxonomy shared by every core subsystem.

use serde::Serialize;
use thiserror::Error;

/// A single structural problem found while validating a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Offending key (empty string when the key itself is missing).
    pub key: String,
    /// What is wrong with it.
    pub reason: ViolationReason,
}

/// Kinds of snapshot violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationReason {
    EmptyKey,
    DuplicateKey,
    NullValue,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.reason {
            ViolationReason::EmptyKey => "empty key",
            ViolationReason::DuplicateKey => "duplicate key",
            ViolationReason::NullValue => "null value",
        };
        write!(f, "{} ({})", self.key, reason)
    }
}

/// Errors returned by catalog, versioning, resolution, snapshot and push operations.
#[derive(Debug, Error)]
pub enum ConfigCenterError {
    /// Application, environment, key, version, snapshot or connection absent.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An environment would become (or already is) its own ancestor.
    #[error("cyclic inheritance: {}", .chain.join(" -> "))]
    CyclicInheritance { chain: Vec<String> },

    /// Snapshot operation called out of sequence.
    #[error("snapshot {snapshot_id} is {state}")]
    InvalidSnapshotState { snapshot_id: u64, state: String },

    /// Snapshot content violates structural rules.
    #[error("validation failed: {}", format_violations(.0))]
    ValidationFailed(Vec<Violation>),

    /// A concurrent scope-level write won the race. Retryable by the caller.
    #[error("version conflict: expected {expected}, current {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// Push delivery target unreachable.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ConfigCenterError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CyclicInheritance { .. } => "CYCLIC_INHERITANCE",
            Self::InvalidSnapshotState { .. } => "INVALID_SNAPSHOT_STATE",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::ConnectionLost(_) => "CONNECTION_LOST",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type ConfigResult<T> = Result<T, ConfigCenterError>;
