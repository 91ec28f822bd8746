//! JSON state file.
//!
//! # Responsibilities
//! - Serialize durable state (catalog, versions, snapshots) to one file
//! - Load it back at startup
//!
//! # Design Decisions
//! - Writes go to a sibling temp file that is renamed over the target, so
//!   a crash mid-write never leaves a truncated state file
//! - Client connections are ephemeral and never persisted

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Application, Environment};
use crate::snapshots::ConfigSnapshot;
use crate::versioning::ConfigVersion;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("state file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub versions: Vec<ConfigVersion>,
    #[serde(default)]
    pub snapshots: Vec<ConfigSnapshot>,
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist yet.
    pub fn load(&self) -> Result<Option<PersistedState>, StorageError> {
        if !self.path.exists() {
            tracing::info!(path = ?self.path, "No state file yet, starting empty");
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        let state: PersistedState = serde_json::from_reader(BufReader::new(file))?;
        tracing::info!(
            path = ?self.path,
            applications = state.applications.len(),
            versions = state.versions.len(),
            snapshots = state.snapshots.len(),
            "Loaded state file"
        );
        Ok(Some(state))
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, state)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = ?self.path,
            versions = state.versions.len(),
            snapshots = state.snapshots.len(),
            "Saved state file"
        );
        Ok(())
    }
}
