//! Environment-inheritance resolution.
//!
//! # Responsibilities
//! - Merge a scope's configuration across its ancestor chain
//! - Report which environment supplied each effective value
//! - Surface drift between an application's environments
//!
//! # Design Decisions
//! - Resolution is computed on read; nothing is cached, so a re-parent is
//!   visible to the very next read
//! - The chain comes from the catalog already cycle-checked; a cycle fails
//!   the read instead of looping

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{ApplicationId, Catalog, EnvironmentId, Scope};
use crate::error::{ConfigCenterError, ConfigResult};
use crate::versioning::VersionStore;

/// Effective value of a key and the environment that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedValue {
    pub value: String,
    pub source_environment_id: EnvironmentId,
}

/// Merged configuration of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
    /// Root first, ending with the target environment.
    pub chain: Vec<EnvironmentId>,
    pub entries: BTreeMap<String, ResolvedValue>,
}

impl ResolvedConfig {
    /// Plain key → value view, without provenance.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}

/// Per-key drift of an application against its baseline environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDrift {
    /// Baseline value, `None` when the baseline does not define the key.
    pub baseline: Option<String>,
    /// Environments whose resolved value differs. `None` means the key is absent there.
    pub environments: BTreeMap<EnvironmentId, Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub application_id: ApplicationId,
    pub baseline_environment_id: Option<EnvironmentId>,
    /// Only keys with at least one differing environment appear.
    pub keys: BTreeMap<String, KeyDrift>,
}

/// Resolves merged configuration from the catalog topology and version store items.
#[derive(Clone)]
pub struct InheritanceResolver {
    catalog: Arc<Catalog>,
    versions: Arc<VersionStore>,
}

impl InheritanceResolver {
    pub fn new(catalog: Arc<Catalog>, versions: Arc<VersionStore>) -> Self {
        Self { catalog, versions }
    }

    /// Merge root → target; the nearest environment wins.
    pub fn resolve(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<ResolvedConfig> {
        let chain = self.catalog.environment_chain(app, env)?;
        let mut entries = BTreeMap::new();

        for link in &chain {
            let scope = Scope {
                application_id: app.clone(),
                environment_id: link.clone(),
            };
            for (key, item) in self.versions.current_items(&scope) {
                entries.insert(
                    key,
                    ResolvedValue {
                        value: item.value,
                        source_environment_id: link.clone(),
                    },
                );
            }
        }

        tracing::debug!(app_id = %app, env_id = %env, depth = chain.len(), keys = entries.len(), "Configuration resolved");
        Ok(ResolvedConfig {
            application_id: app.clone(),
            environment_id: env.clone(),
            chain,
            entries,
        })
    }

    /// Effective value of one key with its provenance.
    pub fn resolve_key(&self, app: &ApplicationId, env: &EnvironmentId, key: &str) -> ConfigResult<ResolvedValue> {
        let chain = self.catalog.environment_chain(app, env)?;

        for link in chain.iter().rev() {
            let scope = Scope {
                application_id: app.clone(),
                environment_id: link.clone(),
            };
            if let Ok(item) = self.versions.item(&scope, key) {
                return Ok(ResolvedValue {
                    value: item.value,
                    source_environment_id: link.clone(),
                });
            }
        }
        Err(ConfigCenterError::not_found("config item", key))
    }

    /// Resolve every environment and diff it against the default environment.
    pub fn compute_differences(&self, app: &ApplicationId) -> ConfigResult<DriftReport> {
        let environments = self.catalog.list_environments(app)?;
        let baseline_id = self.catalog.default_environment(app)?;

        let baseline = match &baseline_id {
            Some(id) => self.resolve(app, id)?.values(),
            None => BTreeMap::new(),
        };

        let mut keys: BTreeMap<String, KeyDrift> = BTreeMap::new();
        for environment in environments {
            if Some(&environment.id) == baseline_id.as_ref() {
                continue;
            }
            let resolved = self.resolve(app, &environment.id)?.values();

            for (key, value) in &resolved {
                if baseline.get(key) != Some(value) {
                    keys.entry(key.clone())
                        .or_insert_with(|| KeyDrift {
                            baseline: baseline.get(key).cloned(),
                            environments: BTreeMap::new(),
                        })
                        .environments
                        .insert(environment.id.clone(), Some(value.clone()));
                }
            }
            for (key, value) in &baseline {
                if !resolved.contains_key(key) {
                    keys.entry(key.clone())
                        .or_insert_with(|| KeyDrift {
                            baseline: Some(value.clone()),
                            environments: BTreeMap::new(),
                        })
                        .environments
                        .insert(environment.id.clone(), None);
                }
            }
        }

        Ok(DriftReport {
            application_id: app.clone(),
            baseline_environment_id: baseline_id,
            keys,
        })
    }
}
