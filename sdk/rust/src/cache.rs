//! On-disk copy of the last applied configuration.
//!
//! Lets a session start with usable values while the config center is
//! unreachable. The file is JSON and records the scope it was written for;
//! a file written for another application or environment is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SdkResult;
use crate::store::ConfigState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    application_id: String,
    environment_id: String,
    state: ConfigState,
}

#[derive(Debug, Clone)]
pub struct ConfigCache {
    path: PathBuf,
    application_id: String,
    environment_id: String,
}

impl ConfigCache {
    pub fn new(path: impl Into<PathBuf>, application_id: &str, environment_id: &str) -> Self {
        Self {
            path: path.into(),
            application_id: application_id.to_string(),
            environment_id: environment_id.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when there is no file yet or it belongs to another scope.
    pub fn load(&self) -> SdkResult<Option<ConfigState>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: CacheFile = serde_json::from_slice(&raw)?;
        if file.application_id != self.application_id || file.environment_id != self.environment_id {
            tracing::warn!(
                path = %self.path.display(),
                cached_app = %file.application_id,
                cached_env = %file.environment_id,
                "Ignoring config cache written for another scope"
            );
            return Ok(None);
        }
        Ok(Some(file.state))
    }

    /// Write through a temp file and rename so readers never see a torn file.
    pub fn save(&self, state: &ConfigState) -> SdkResult<()> {
        let file = CacheFile {
            application_id: self.application_id.clone(),
            environment_id: self.environment_id.clone(),
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
