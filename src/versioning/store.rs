//! Append-only version store.
//!
//! # Responsibilities
//! - Assign gap-free, strictly increasing version numbers per scope
//! - Keep the current item projection in step with the history
//! - Roll back by appending, never by rewriting
//!
//! # Design Decisions
//! - One mutex per scope; appends to different scopes never contend
//! - Version `n` lives at index `n - 1` of the scope's history

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::catalog::Scope;
use crate::error::{ConfigCenterError, ConfigResult};
use crate::observability::metrics;
use crate::versioning::diff::{diff_maps, ConfigDiff};
use crate::versioning::types::{ChangeType, ConfigItem, ConfigVersion, NewVersion};

#[derive(Debug, Default)]
struct ScopeHistory {
    versions: Vec<ConfigVersion>,
    items: BTreeMap<String, ConfigItem>,
}

impl ScopeHistory {
    fn current_version(&self) -> u64 {
        self.versions.len() as u64
    }

    fn version(&self, number: u64) -> Option<&ConfigVersion> {
        if number == 0 {
            return None;
        }
        self.versions.get((number - 1) as usize)
    }

    fn apply(&mut self, version: ConfigVersion) {
        match version.change_type {
            ChangeType::Delete => {
                self.items.remove(&version.key);
            }
            ChangeType::Create | ChangeType::Update => {
                self.items.insert(
                    version.key.clone(),
                    ConfigItem {
                        application_id: version.application_id.clone(),
                        environment_id: version.environment_id.clone(),
                        key: version.key.clone(),
                        value: version.value.clone().unwrap_or_default(),
                        current_version_number: version.version_number,
                        updated_at: version.timestamp,
                        updated_by: version.author.clone(),
                    },
                );
            }
        }
        self.versions.push(version);
    }

    /// Reject a request that does not match the item's current state.
    fn check(&self, request: &NewVersion) -> ConfigResult<()> {
        if request.key.trim().is_empty() {
            return Err(ConfigCenterError::InvalidRequest("config key must not be empty".into()));
        }

        let exists = self.items.contains_key(&request.key);
        match request.change_type {
            ChangeType::Create if exists => Err(ConfigCenterError::already_exists("config item", &request.key)),
            ChangeType::Update | ChangeType::Delete if !exists => {
                Err(ConfigCenterError::not_found("config item", &request.key))
            }
            ChangeType::Create | ChangeType::Update if request.value.is_none() => Err(
                ConfigCenterError::InvalidRequest(format!("{} of {} requires a value", request.change_type, request.key)),
            ),
            _ => Ok(()),
        }
    }

    fn append(&mut self, scope: &Scope, request: NewVersion) -> ConfigResult<ConfigVersion> {
        self.check(&request)?;
        Ok(self.commit(scope, request))
    }

    /// Number and record an already-checked request.
    fn commit(&mut self, scope: &Scope, request: NewVersion) -> ConfigVersion {
        let value = match request.change_type {
            ChangeType::Delete => None,
            ChangeType::Create | ChangeType::Update => request.value,
        };
        let version = ConfigVersion {
            application_id: scope.application_id.clone(),
            environment_id: scope.environment_id.clone(),
            key: request.key,
            version_number: self.current_version() + 1,
            value,
            change_type: request.change_type,
            timestamp: Utc::now(),
            author: request.author,
        };
        self.apply(version.clone());
        version
    }

    fn state_at(&self, number: u64) -> ConfigResult<BTreeMap<String, String>> {
        if self.version(number).is_none() {
            return Err(ConfigCenterError::not_found("version", number));
        }
        let mut state = BTreeMap::new();
        for version in &self.versions[..number as usize] {
            match (&version.change_type, &version.value) {
                (ChangeType::Delete, _) | (_, None) => {
                    state.remove(&version.key);
                }
                (_, Some(value)) => {
                    state.insert(version.key.clone(), value.clone());
                }
            }
        }
        Ok(state)
    }
}

/// Per-scope append-only history of configuration mutations.
#[derive(Debug, Default)]
pub struct VersionStore {
    scopes: DashMap<Scope, Arc<Mutex<ScopeHistory>>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope_entry(&self, scope: &Scope) -> Arc<Mutex<ScopeHistory>> {
        if let Some(existing) = self.scopes.get(scope) {
            return existing.value().clone();
        }
        self.scopes.entry(scope.clone()).or_default().value().clone()
    }

    fn existing_scope(&self, scope: &Scope) -> Option<Arc<Mutex<ScopeHistory>>> {
        self.scopes.get(scope).map(|r| r.value().clone())
    }

    /// Append a mutation, assigning `current max + 1` for the scope.
    pub fn append(&self, scope: &Scope, request: NewVersion) -> ConfigResult<ConfigVersion> {
        let entry = self.scope_entry(scope);
        let version = entry.lock().append(scope, request)?;
        self.record_append(scope, &version);
        Ok(version)
    }

    /// Append only if the scope is still at `expected` (optimistic write).
    pub fn append_expecting(&self, scope: &Scope, request: NewVersion, expected: u64) -> ConfigResult<ConfigVersion> {
        let entry = self.scope_entry(scope);
        let version = {
            let mut history = entry.lock();
            let actual = history.current_version();
            if actual != expected {
                return Err(ConfigCenterError::VersionConflict { expected, actual });
            }
            history.append(scope, request)?
        };
        self.record_append(scope, &version);
        Ok(version)
    }

    /// Append several mutations under one scope lock, all or nothing.
    ///
    /// Keys must be distinct; every request is checked before the first
    /// version is numbered, so a failure leaves the scope untouched.
    pub fn append_batch(&self, scope: &Scope, requests: Vec<NewVersion>) -> ConfigResult<Vec<ConfigVersion>> {
        let mut keys = HashSet::new();
        if let Some(dup) = requests.iter().find(|r| !keys.insert(r.key.as_str())) {
            return Err(ConfigCenterError::InvalidRequest(format!("{} appears twice in one batch", dup.key)));
        }

        let entry = self.scope_entry(scope);
        let versions = {
            let mut history = entry.lock();
            for request in &requests {
                history.check(request)?;
            }
            requests
                .into_iter()
                .map(|request| history.commit(scope, request))
                .collect::<Vec<_>>()
        };

        for version in &versions {
            self.record_append(scope, version);
        }
        Ok(versions)
    }

    fn record_append(&self, scope: &Scope, version: &ConfigVersion) {
        metrics::record_version_appended(&version.change_type.to_string());
        tracing::info!(
            scope = %scope,
            key = %version.key,
            version = version.version_number,
            change_type = %version.change_type,
            author = %version.author,
            "Config version appended"
        );
    }

    /// Append a new version carrying the value `key` had at `target`.
    pub fn rollback(&self, scope: &Scope, key: &str, target: u64, author: &str) -> ConfigResult<ConfigVersion> {
        let entry = self
            .existing_scope(scope)
            .ok_or_else(|| ConfigCenterError::not_found("version", target))?;

        let version = {
            let mut history = entry.lock();
            let target_version = history
                .version(target)
                .filter(|v| v.key == key)
                .ok_or_else(|| ConfigCenterError::not_found("version", format!("{key}@{target}")))?;

            // Restoring a value is always an UPDATE, even when the key is
            // currently deleted; the projection re-inserts it.
            let exists = history.items.contains_key(key);
            let (change_type, value) = match (&target_version.change_type, &target_version.value) {
                (ChangeType::Delete, _) | (_, None) if exists => (ChangeType::Delete, None),
                (ChangeType::Delete, _) | (_, None) => {
                    return Err(ConfigCenterError::InvalidRequest(format!(
                        "{key} is already deleted"
                    )))
                }
                (_, Some(value)) => (ChangeType::Update, Some(value.clone())),
            };

            history.commit(
                scope,
                NewVersion {
                    key: key.to_string(),
                    value,
                    change_type,
                    author: author.to_string(),
                },
            )
        };

        tracing::info!(scope = %scope, key = %key, target, version = version.version_number, "Config item rolled back");
        self.record_append(scope, &version);
        Ok(version)
    }

    /// Highest version number of the scope, `0` when nothing was written yet.
    pub fn current_version(&self, scope: &Scope) -> u64 {
        self.existing_scope(scope)
            .map(|entry| entry.lock().current_version())
            .unwrap_or(0)
    }

    /// The scope's own items (no inheritance applied).
    pub fn current_items(&self, scope: &Scope) -> BTreeMap<String, ConfigItem> {
        self.existing_scope(scope)
            .map(|entry| entry.lock().items.clone())
            .unwrap_or_default()
    }

    pub fn item(&self, scope: &Scope, key: &str) -> ConfigResult<ConfigItem> {
        self.existing_scope(scope)
            .and_then(|entry| entry.lock().items.get(key).cloned())
            .ok_or_else(|| ConfigCenterError::not_found("config item", key))
    }

    /// History of one key, newest first.
    pub fn history(&self, scope: &Scope, key: &str) -> ConfigResult<Vec<ConfigVersion>> {
        let versions: Vec<ConfigVersion> = self
            .existing_scope(scope)
            .map(|entry| {
                entry
                    .lock()
                    .versions
                    .iter()
                    .rev()
                    .filter(|v| v.key == key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if versions.is_empty() {
            return Err(ConfigCenterError::not_found("config item", key));
        }
        Ok(versions)
    }

    /// Every version of the scope, newest first.
    pub fn scope_history(&self, scope: &Scope) -> Vec<ConfigVersion> {
        self.existing_scope(scope)
            .map(|entry| entry.lock().versions.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_version(&self, scope: &Scope, number: u64) -> ConfigResult<ConfigVersion> {
        self.existing_scope(scope)
            .and_then(|entry| entry.lock().version(number).cloned())
            .ok_or_else(|| ConfigCenterError::not_found("version", number))
    }

    /// The scope's own item map as it stood right after version `number`.
    pub fn state_at(&self, scope: &Scope, number: u64) -> ConfigResult<BTreeMap<String, String>> {
        let entry = self
            .existing_scope(scope)
            .ok_or_else(|| ConfigCenterError::not_found("version", number))?;
        let history = entry.lock();
        history.state_at(number)
    }

    /// Structural diff between the states at versions `from` and `to`.
    pub fn compare_versions(&self, scope: &Scope, from: u64, to: u64) -> ConfigResult<ConfigDiff<String>> {
        let entry = self
            .existing_scope(scope)
            .ok_or_else(|| ConfigCenterError::not_found("version", from))?;
        let history = entry.lock();
        let left = history.state_at(from)?;
        let right = history.state_at(to)?;
        Ok(diff_maps(&left, &right))
    }

    /// Rebuild histories from persisted versions.
    pub fn restore(&self, mut versions: Vec<ConfigVersion>) {
        versions.sort_by(|a, b| {
            a.scope()
                .cmp(&b.scope())
                .then(a.version_number.cmp(&b.version_number))
        });

        for version in versions {
            let scope = version.scope();
            let entry = self.scope_entry(&scope);
            let mut history = entry.lock();
            if version.version_number != history.current_version() + 1 {
                tracing::warn!(
                    scope = %scope,
                    version = version.version_number,
                    expected = history.current_version() + 1,
                    "Skipping out-of-sequence persisted version"
                );
                continue;
            }
            history.apply(version);
        }
    }

    /// Every version of every scope, for persistence.
    pub fn export(&self) -> Vec<ConfigVersion> {
        let entries: Vec<Arc<Mutex<ScopeHistory>>> = self.scopes.iter().map(|r| r.value().clone()).collect();
        entries
            .iter()
            .flat_map(|entry| entry.lock().versions.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scope() -> Scope {
        Scope::new("shop", "prod")
    }

    fn write(store: &VersionStore, key: &str, value: &str, change_type: ChangeType) -> ConfigVersion {
        store
            .append(
                &scope(),
                NewVersion {
                    key: key.into(),
                    value: Some(value.into()),
                    change_type,
                    author: "alice".into(),
                },
            )
            .unwrap()
    }

    #[test]
    fn numbers_are_per_scope_not_per_key() {
        let store = VersionStore::new();
        assert_eq!(write(&store, "timeout", "30", ChangeType::Create).version_number, 1);
        assert_eq!(write(&store, "region", "east", ChangeType::Create).version_number, 2);
        assert_eq!(write(&store, "timeout", "45", ChangeType::Update).version_number, 3);

        let other = Scope::new("shop", "dev");
        let v = store
            .append(
                &other,
                NewVersion {
                    key: "timeout".into(),
                    value: Some("1".into()),
                    change_type: ChangeType::Create,
                    author: "bob".into(),
                },
            )
            .unwrap();
        assert_eq!(v.version_number, 1);
    }

    #[test]
    fn change_type_must_match_item_state() {
        let store = VersionStore::new();
        let update = store.append(
            &scope(),
            NewVersion {
                key: "missing".into(),
                value: Some("x".into()),
                change_type: ChangeType::Update,
                author: "alice".into(),
            },
        );
        assert!(matches!(update, Err(ConfigCenterError::NotFound { .. })));

        write(&store, "timeout", "30", ChangeType::Create);
        let create_again = store.append(
            &scope(),
            NewVersion {
                key: "timeout".into(),
                value: Some("31".into()),
                change_type: ChangeType::Create,
                author: "alice".into(),
            },
        );
        assert!(matches!(create_again, Err(ConfigCenterError::AlreadyExists { .. })));
        assert_eq!(store.current_version(&scope()), 1);
    }

    #[test]
    fn history_is_newest_first() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);
        write(&store, "region", "east", ChangeType::Create);
        write(&store, "timeout", "45", ChangeType::Update);

        let history = store.history(&scope(), "timeout").unwrap();
        let numbers: Vec<u64> = history.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![3, 1]);
    }

    #[test]
    fn rollback_appends_forward_version() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);
        write(&store, "timeout", "45", ChangeType::Update);

        let rolled = store.rollback(&scope(), "timeout", 1, "carol").unwrap();
        assert_eq!(rolled.version_number, 3);
        assert_eq!(rolled.value.as_deref(), Some("30"));
        assert_eq!(rolled.change_type, ChangeType::Update);

        let original = store.get_version(&scope(), 1).unwrap();
        assert_eq!(original.value.as_deref(), Some("30"));
        assert_eq!(original.author, "alice");
        assert_eq!(store.item(&scope(), "timeout").unwrap().value, "30");
    }

    #[test]
    fn rollback_of_deleted_key_is_an_update() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);
        store
            .append(
                &scope(),
                NewVersion {
                    key: "timeout".into(),
                    value: None,
                    change_type: ChangeType::Delete,
                    author: "alice".into(),
                },
            )
            .unwrap();

        let rolled = store.rollback(&scope(), "timeout", 1, "carol").unwrap();
        assert_eq!(rolled.version_number, 3);
        assert_eq!(rolled.change_type, ChangeType::Update);
        assert_eq!(store.item(&scope(), "timeout").unwrap().value, "30");
        assert_eq!(store.state_at(&scope(), 3).unwrap()["timeout"], "30");

        let restored = VersionStore::new();
        restored.restore(store.export());
        assert_eq!(restored.item(&scope(), "timeout").unwrap().current_version_number, 3);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);

        let request = |key: &str, change_type| NewVersion {
            key: key.into(),
            value: Some("1".into()),
            change_type,
            author: "importer".into(),
        };

        let rejected = store.append_batch(
            &scope(),
            vec![request("region", ChangeType::Create), request("timeout", ChangeType::Create)],
        );
        assert!(matches!(rejected, Err(ConfigCenterError::AlreadyExists { .. })));
        assert_eq!(store.current_version(&scope()), 1);

        let applied = store
            .append_batch(
                &scope(),
                vec![request("region", ChangeType::Create), request("timeout", ChangeType::Update)],
            )
            .unwrap();
        let numbers: Vec<u64> = applied.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert_eq!(store.item(&scope(), "timeout").unwrap().value, "1");
    }

    #[test]
    fn rollback_rejects_unknown_or_foreign_versions() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);
        write(&store, "region", "east", ChangeType::Create);

        assert!(store.rollback(&scope(), "timeout", 9, "carol").is_err());
        assert!(store.rollback(&scope(), "timeout", 2, "carol").is_err());
        assert_eq!(store.current_version(&scope()), 2);
    }

    #[test]
    fn optimistic_append_reports_conflict() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);

        let stale = store.append_expecting(
            &scope(),
            NewVersion {
                key: "timeout".into(),
                value: Some("60".into()),
                change_type: ChangeType::Update,
                author: "bob".into(),
            },
            0,
        );
        match stale {
            Err(ConfigCenterError::VersionConflict { expected, actual }) => {
                assert_eq!((expected, actual), (0, 1));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn compare_versions_uses_replayed_state() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);
        write(&store, "region", "east", ChangeType::Create);
        write(&store, "timeout", "45", ChangeType::Update);

        let diff = store.compare_versions(&scope(), 1, 3).unwrap();
        assert_eq!(diff.added.get("region").map(String::as_str), Some("east"));
        assert_eq!(diff.changed["timeout"].to, "45");
        assert!(diff.removed.is_empty());

        let reverse = store.compare_versions(&scope(), 3, 1).unwrap();
        assert_eq!(reverse.removed, diff.added);

        assert!(matches!(
            store.compare_versions(&scope(), 1, 42),
            Err(ConfigCenterError::NotFound { kind: "version", .. })
        ));
    }

    #[test]
    fn concurrent_appends_are_gap_free() {
        let store = Arc::new(VersionStore::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            store
                                .append(
                                    &scope(),
                                    NewVersion {
                                        key: format!("k-{t}-{i}"),
                                        value: Some(i.to_string()),
                                        change_type: ChangeType::Create,
                                        author: "load".into(),
                                    },
                                )
                                .unwrap()
                                .version_number
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in threads {
            for n in handle.join().unwrap() {
                assert!(seen.insert(n), "duplicate version {n}");
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(seen.iter().max(), Some(&400));
        assert_eq!(seen.iter().min(), Some(&1));
    }

    #[test]
    fn restore_replays_projection() {
        let store = VersionStore::new();
        write(&store, "timeout", "30", ChangeType::Create);
        write(&store, "region", "east", ChangeType::Create);
        store
            .append(
                &scope(),
                NewVersion {
                    key: "region".into(),
                    value: None,
                    change_type: ChangeType::Delete,
                    author: "alice".into(),
                },
            )
            .unwrap();

        let restored = VersionStore::new();
        restored.restore(store.export());
        assert_eq!(restored.current_version(&scope()), 3);
        let items = restored.current_items(&scope());
        assert_eq!(items.len(), 1);
        assert_eq!(items["timeout"].value, "30");
    }
}
