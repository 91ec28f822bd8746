//! Snapshot staging, publication and rollback.
//!
//! # Responsibilities
//! - Freeze resolved configuration into staged snapshots
//! - Publish a staged snapshot atomically per scope
//! - Roll back by re-publishing historical content as a new snapshot
//!
//! # Design Decisions
//! - One mutex per scope guards "which snapshot is published"; unrelated
//!   scopes publish in parallel
//! - The publish listener runs under the scope lock, so notifications for a
//!   scope leave in commit order and the last commit is the last push
//! - A global id index lets id-only operations find their scope without scans

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::catalog::Scope;
use crate::error::{ConfigCenterError, ConfigResult, Violation};
use crate::inheritance::InheritanceResolver;
use crate::observability::metrics;
use crate::snapshots::types::{ConfigSnapshot, SnapshotDraft, SnapshotItem, SnapshotStatistics, SnapshotStatus};
use crate::snapshots::validation::{flatten_document, validate_items};
use crate::versioning::{diff_maps, ConfigDiff, VersionStore};

/// Receives every successful publish.
///
/// Called with the scope lock held; implementations must not call back into
/// the snapshot manager for the same scope.
pub trait PublishListener: Send + Sync {
    fn on_published(&self, snapshot: &ConfigSnapshot);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotComparison {
    pub left: u64,
    pub right: u64,
    pub diff: ConfigDiff<Option<String>>,
}

#[derive(Debug, Default)]
struct ScopeSnapshots {
    /// Keyed by id; ids are allocated in creation order.
    snapshots: BTreeMap<u64, ConfigSnapshot>,
    last_version_number: u64,
    staged: Option<u64>,
    published: Option<u64>,
}

pub struct SnapshotManager {
    resolver: InheritanceResolver,
    versions: Arc<VersionStore>,
    scopes: DashMap<Scope, Arc<Mutex<ScopeSnapshots>>>,
    index: DashMap<u64, Scope>,
    next_id: AtomicU64,
    listener: Option<Arc<dyn PublishListener>>,
}

impl SnapshotManager {
    pub fn new(resolver: InheritanceResolver, versions: Arc<VersionStore>) -> Self {
        Self {
            resolver,
            versions,
            scopes: DashMap::new(),
            index: DashMap::new(),
            next_id: AtomicU64::new(1),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn PublishListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn scope_entry(&self, scope: &Scope) -> Arc<Mutex<ScopeSnapshots>> {
        if let Some(existing) = self.scopes.get(scope) {
            return existing.value().clone();
        }
        self.scopes.entry(scope.clone()).or_default().value().clone()
    }

    fn existing_scope(&self, scope: &Scope) -> Option<Arc<Mutex<ScopeSnapshots>>> {
        self.scopes.get(scope).map(|r| r.value().clone())
    }

    fn scope_of(&self, id: u64) -> Option<Scope> {
        self.index.get(&id).map(|r| r.value().clone())
    }

    /// Freeze the current merged view of `scope` into a new staged snapshot.
    pub fn create_staged(&self, scope: &Scope, draft: SnapshotDraft) -> ConfigResult<ConfigSnapshot> {
        let source_version = self.versions.current_version(scope);
        let resolved = self.resolver.resolve(&scope.application_id, &scope.environment_id)?;
        let items = resolved
            .entries
            .into_iter()
            .map(|(key, resolved)| SnapshotItem::new(key, resolved.value))
            .collect();

        let entry = self.scope_entry(scope);
        let mut state = entry.lock();
        Ok(self.stage_locked(&mut state, scope, items, draft, source_version))
    }

    /// Stage an explicitly supplied JSON document instead of the merged view.
    pub fn create_staged_from_document(
        &self,
        scope: &Scope,
        document: &serde_json::Value,
        draft: SnapshotDraft,
    ) -> ConfigResult<ConfigSnapshot> {
        let items = flatten_document(document)?;
        let source_version = self.versions.current_version(scope);

        let entry = self.scope_entry(scope);
        let mut state = entry.lock();
        Ok(self.stage_locked(&mut state, scope, items, draft, source_version))
    }

    fn stage_locked(
        &self,
        state: &mut ScopeSnapshots,
        scope: &Scope,
        items: Vec<SnapshotItem>,
        draft: SnapshotDraft,
        source_version: u64,
    ) -> ConfigSnapshot {
        if let Some(previous) = state.staged.take() {
            if let Some(old) = state.snapshots.get_mut(&previous) {
                old.status = SnapshotStatus::Discarded;
                tracing::debug!(snapshot_id = previous, scope = %scope, "Staged snapshot discarded");
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        state.last_version_number += 1;
        let snapshot = ConfigSnapshot {
            id,
            application_id: scope.application_id.clone(),
            environment_id: scope.environment_id.clone(),
            snapshot_version_number: state.last_version_number,
            status: SnapshotStatus::Staged,
            items,
            name: draft
                .name
                .unwrap_or_else(|| format!("{} #{}", scope, state.last_version_number)),
            description: draft.description,
            created_by: draft.author,
            created_at: Utc::now(),
            published_at: None,
            published_by: None,
            source_version,
        };

        state.snapshots.insert(id, snapshot.clone());
        state.staged = Some(id);
        self.index.insert(id, scope.clone());

        tracing::info!(
            snapshot_id = id,
            scope = %scope,
            version = snapshot.snapshot_version_number,
            items = snapshot.items.len(),
            "Staged snapshot created"
        );
        snapshot
    }

    /// Structural violations of a snapshot. Read-only.
    pub fn validate(&self, id: u64) -> ConfigResult<Vec<Violation>> {
        let snapshot = self.get(id)?;
        Ok(validate_items(&snapshot.items))
    }

    /// Publish a staged snapshot, superseding the scope's current one.
    pub fn publish(&self, id: u64, author: &str) -> ConfigResult<ConfigSnapshot> {
        let scope = self.scope_of(id).ok_or_else(|| ConfigCenterError::InvalidSnapshotState {
            snapshot_id: id,
            state: "missing".into(),
        })?;
        let entry = self.scope_entry(&scope);
        let mut state = entry.lock();
        self.publish_locked(&mut state, id, author)
    }

    fn publish_locked(&self, state: &mut ScopeSnapshots, id: u64, author: &str) -> ConfigResult<ConfigSnapshot> {
        let candidate = state
            .snapshots
            .get(&id)
            .ok_or_else(|| ConfigCenterError::InvalidSnapshotState {
                snapshot_id: id,
                state: "missing".into(),
            })?;
        if candidate.status != SnapshotStatus::Staged {
            return Err(ConfigCenterError::InvalidSnapshotState {
                snapshot_id: id,
                state: candidate.status.to_string(),
            });
        }

        let violations = validate_items(&candidate.items);
        if !violations.is_empty() {
            tracing::warn!(snapshot_id = id, violations = violations.len(), "Publish rejected by validation");
            return Err(ConfigCenterError::ValidationFailed(violations));
        }

        if let Some(previous) = state.published.take() {
            if let Some(old) = state.snapshots.get_mut(&previous) {
                old.status = SnapshotStatus::Superseded;
            }
        }

        let published = match state.snapshots.get_mut(&id) {
            Some(snapshot) => {
                snapshot.status = SnapshotStatus::Published;
                snapshot.published_at = Some(Utc::now());
                snapshot.published_by = Some(author.to_string());
                snapshot.clone()
            }
            None => return Err(ConfigCenterError::not_found("snapshot", id)),
        };
        state.published = Some(id);
        if state.staged == Some(id) {
            state.staged = None;
        }

        metrics::record_snapshot_published();
        tracing::info!(
            snapshot_id = id,
            app_id = %published.application_id,
            env_id = %published.environment_id,
            version = published.snapshot_version_number,
            author = %author,
            "Snapshot published"
        );

        if let Some(listener) = &self.listener {
            listener.on_published(&published);
        }
        Ok(published)
    }

    /// Re-publish a historical snapshot's items as a brand-new snapshot.
    pub fn rollback_to_snapshot(&self, scope: &Scope, target: u64, author: &str) -> ConfigResult<ConfigSnapshot> {
        let entry = self
            .existing_scope(scope)
            .ok_or_else(|| ConfigCenterError::not_found("snapshot", target))?;
        let mut state = entry.lock();

        let source = state
            .snapshots
            .get(&target)
            .ok_or_else(|| ConfigCenterError::not_found("snapshot", target))?;
        if !matches!(source.status, SnapshotStatus::Published | SnapshotStatus::Superseded) {
            return Err(ConfigCenterError::InvalidSnapshotState {
                snapshot_id: target,
                state: source.status.to_string(),
            });
        }

        let items = source.items.clone();
        let draft = SnapshotDraft {
            name: Some(format!("Rollback to {}", source.name)),
            description: Some(format!("Rollback to snapshot {target}")),
            author: author.to_string(),
        };
        let source_version = self.versions.current_version(scope);

        let staged = self.stage_locked(&mut state, scope, items, draft, source_version);
        tracing::info!(scope = %scope, target, snapshot_id = staged.id, "Rolling back to snapshot");
        self.publish_locked(&mut state, staged.id, author)
    }

    /// Diff of two snapshots' item maps, `left` → `right`.
    pub fn compare(&self, left: u64, right: u64) -> ConfigResult<SnapshotComparison> {
        let left_map = self.get(left)?.item_map();
        let right_map = self.get(right)?.item_map();
        Ok(SnapshotComparison {
            left,
            right,
            diff: diff_maps(&left_map, &right_map),
        })
    }

    pub fn get(&self, id: u64) -> ConfigResult<ConfigSnapshot> {
        let scope = self
            .scope_of(id)
            .ok_or_else(|| ConfigCenterError::not_found("snapshot", id))?;
        self.existing_scope(&scope)
            .and_then(|entry| entry.lock().snapshots.get(&id).cloned())
            .ok_or_else(|| ConfigCenterError::not_found("snapshot", id))
    }

    /// All snapshots of the scope, newest first.
    pub fn list(&self, scope: &Scope) -> Vec<ConfigSnapshot> {
        self.existing_scope(scope)
            .map(|entry| entry.lock().snapshots.values().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest_published(&self, scope: &Scope) -> Option<ConfigSnapshot> {
        let entry = self.existing_scope(scope)?;
        let state = entry.lock();
        state.published.and_then(|id| state.snapshots.get(&id).cloned())
    }

    pub fn latest_staged(&self, scope: &Scope) -> Option<ConfigSnapshot> {
        let entry = self.existing_scope(scope)?;
        let state = entry.lock();
        state.staged.and_then(|id| state.snapshots.get(&id).cloned())
    }

    pub fn statistics(&self, scope: &Scope) -> SnapshotStatistics {
        let Some(entry) = self.existing_scope(scope) else {
            return SnapshotStatistics::default();
        };
        let state = entry.lock();

        let mut stats = SnapshotStatistics {
            total_snapshots: state.snapshots.len(),
            ..Default::default()
        };
        for snapshot in state.snapshots.values() {
            match snapshot.status {
                SnapshotStatus::Staged => stats.staged_snapshots += 1,
                SnapshotStatus::Published => stats.published_snapshots += 1,
                SnapshotStatus::Superseded => stats.superseded_snapshots += 1,
                SnapshotStatus::Discarded => stats.discarded_snapshots += 1,
            }
        }
        if let Some(latest) = state.published.and_then(|id| state.snapshots.get(&id)) {
            stats.latest_published_version = Some(latest.snapshot_version_number);
            stats.latest_published_name = Some(latest.name.clone());
        }
        stats
    }

    /// Rebuild from persisted snapshots; the id counter resumes after the highest id.
    pub fn restore(&self, snapshots: Vec<ConfigSnapshot>) {
        for snapshot in snapshots {
            let scope = snapshot.scope();
            let entry = self.scope_entry(&scope);
            let mut state = entry.lock();

            state.last_version_number = state.last_version_number.max(snapshot.snapshot_version_number);
            match snapshot.status {
                SnapshotStatus::Staged => state.staged = Some(snapshot.id),
                SnapshotStatus::Published => state.published = Some(snapshot.id),
                SnapshotStatus::Superseded | SnapshotStatus::Discarded => {}
            }
            self.next_id.fetch_max(snapshot.id + 1, Ordering::SeqCst);
            self.index.insert(snapshot.id, scope);
            state.snapshots.insert(snapshot.id, snapshot);
        }
    }

    /// Every snapshot of every scope, for persistence.
    pub fn export(&self) -> Vec<ConfigSnapshot> {
        let entries: Vec<Arc<Mutex<ScopeSnapshots>>> = self.scopes.iter().map(|r| r.value().clone()).collect();
        let mut all: Vec<ConfigSnapshot> = entries
            .iter()
            .flat_map(|entry| entry.lock().snapshots.values().cloned().collect::<Vec<_>>())
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::versioning::{ChangeType, NewVersion};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<u64>>,
    }

    impl PublishListener for Recorder {
        fn on_published(&self, snapshot: &ConfigSnapshot) {
            self.published.lock().push(snapshot.id);
        }
    }

    fn setup() -> (Arc<VersionStore>, SnapshotManager, Arc<Recorder>) {
        let catalog = Arc::new(Catalog::new());
        let versions = Arc::new(VersionStore::new());
        catalog.create_application("shop".into(), "Shop").unwrap();
        catalog.create_environment(&"shop".into(), "prod".into(), "Production", None).unwrap();

        let recorder = Arc::new(Recorder::default());
        let manager = SnapshotManager::new(InheritanceResolver::new(catalog, versions.clone()), versions.clone())
            .with_listener(recorder.clone());
        (versions, manager, recorder)
    }

    fn scope() -> Scope {
        Scope::new("shop", "prod")
    }

    fn draft() -> SnapshotDraft {
        SnapshotDraft {
            author: "alice".into(),
            ..Default::default()
        }
    }

    fn set(versions: &VersionStore, key: &str, value: &str) {
        let change_type = if versions.item(&scope(), key).is_ok() {
            ChangeType::Update
        } else {
            ChangeType::Create
        };
        versions
            .append(
                &scope(),
                NewVersion {
                    key: key.into(),
                    value: Some(value.into()),
                    change_type,
                    author: "alice".into(),
                },
            )
            .unwrap();
    }

    #[test]
    fn publish_supersedes_previous() {
        let (versions, manager, recorder) = setup();
        set(&versions, "timeout", "30");
        let first = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(first.id, "alice").unwrap();

        set(&versions, "timeout", "45");
        let second = manager.create_staged(&scope(), draft()).unwrap();
        assert_eq!(second.snapshot_version_number, 2);
        assert_eq!(second.source_version, 2);
        manager.publish(second.id, "bob").unwrap();

        assert_eq!(manager.get(first.id).unwrap().status, SnapshotStatus::Superseded);
        let latest = manager.latest_published(&scope()).unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.published_by.as_deref(), Some("bob"));
        assert_eq!(*recorder.published.lock(), vec![first.id, second.id]);
    }

    #[test]
    fn publishing_twice_is_invalid_state() {
        let (_versions, manager, _) = setup();
        let staged = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(staged.id, "alice").unwrap();

        let again = manager.publish(staged.id, "alice");
        assert!(matches!(again, Err(ConfigCenterError::InvalidSnapshotState { .. })));
        let missing = manager.publish(999, "alice");
        assert!(matches!(missing, Err(ConfigCenterError::InvalidSnapshotState { .. })));
    }

    #[test]
    fn restaging_discards_previous_draft() {
        let (_versions, manager, _) = setup();
        let first = manager.create_staged(&scope(), draft()).unwrap();
        let second = manager.create_staged(&scope(), draft()).unwrap();

        assert_eq!(manager.get(first.id).unwrap().status, SnapshotStatus::Discarded);
        assert_eq!(manager.latest_staged(&scope()).unwrap().id, second.id);
        assert!(manager.publish(first.id, "alice").is_err());
    }

    #[test]
    fn invalid_snapshot_leaves_published_unchanged() {
        let (versions, manager, recorder) = setup();
        set(&versions, "timeout", "30");
        let good = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(good.id, "alice").unwrap();

        let bad = manager
            .create_staged_from_document(&scope(), &json!({ "a.b": 1, "a": { "b": 2 } }), draft())
            .unwrap();
        let violations = manager.validate(bad.id).unwrap();
        assert_eq!(violations.len(), 1);

        let err = manager.publish(bad.id, "alice").unwrap_err();
        assert!(matches!(err, ConfigCenterError::ValidationFailed(_)));
        assert_eq!(manager.latest_published(&scope()).unwrap().id, good.id);
        assert_eq!(manager.get(bad.id).unwrap().status, SnapshotStatus::Staged);
        assert_eq!(recorder.published.lock().len(), 1);
    }

    #[test]
    fn rollback_publishes_new_snapshot_with_old_items() {
        let (versions, manager, _) = setup();
        set(&versions, "timeout", "30");
        let v1 = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(v1.id, "alice").unwrap();

        set(&versions, "timeout", "45");
        let v2 = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(v2.id, "alice").unwrap();

        let rolled = manager.rollback_to_snapshot(&scope(), v1.id, "carol").unwrap();
        assert!(rolled.id > v2.id);
        assert_eq!(rolled.status, SnapshotStatus::Published);
        assert_eq!(rolled.values(), v1.values());
        assert_eq!(rolled.snapshot_version_number, 3);

        assert_eq!(manager.get(v1.id).unwrap().status, SnapshotStatus::Superseded);
        assert_eq!(manager.get(v2.id).unwrap().status, SnapshotStatus::Superseded);
        assert_eq!(manager.list(&scope()).len(), 3);
    }

    #[test]
    fn rollback_to_unpublished_snapshot_is_rejected() {
        let (_versions, manager, _) = setup();
        let staged = manager.create_staged(&scope(), draft()).unwrap();
        let err = manager.rollback_to_snapshot(&scope(), staged.id, "carol").unwrap_err();
        assert!(matches!(err, ConfigCenterError::InvalidSnapshotState { .. }));
    }

    #[test]
    fn compare_is_symmetric() {
        let (versions, manager, _) = setup();
        set(&versions, "timeout", "30");
        set(&versions, "retries", "3");
        let a = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(a.id, "alice").unwrap();

        set(&versions, "timeout", "45");
        set(&versions, "region", "east");
        let b = manager.create_staged(&scope(), draft()).unwrap();

        let forward = manager.compare(a.id, b.id).unwrap().diff;
        let backward = manager.compare(b.id, a.id).unwrap().diff;
        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
        assert_eq!(
            forward.changed.keys().collect::<Vec<_>>(),
            backward.changed.keys().collect::<Vec<_>>()
        );
        assert!(forward.added.contains_key("region"));
    }

    #[test]
    fn concurrent_publishes_leave_exactly_one_published() {
        let (versions, manager, recorder) = setup();
        set(&versions, "timeout", "30");
        let manager = Arc::new(manager);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        if let Ok(staged) = manager.create_staged(&scope(), draft()) {
                            let _ = manager.publish(staged.id, "load");
                        }
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let published: Vec<ConfigSnapshot> = manager
            .list(&scope())
            .into_iter()
            .filter(|s| s.status == SnapshotStatus::Published)
            .collect();
        assert_eq!(published.len(), 1);
        let last_notified = *recorder.published.lock().last().unwrap();
        assert_eq!(published[0].id, last_notified);
    }

    #[test]
    fn statistics_and_restore() {
        let (versions, manager, _) = setup();
        set(&versions, "timeout", "30");
        let first = manager.create_staged(&scope(), draft()).unwrap();
        manager.publish(first.id, "alice").unwrap();
        manager.create_staged(&scope(), draft()).unwrap();

        let stats = manager.statistics(&scope());
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(stats.published_snapshots, 1);
        assert_eq!(stats.staged_snapshots, 1);
        assert_eq!(stats.latest_published_version, Some(1));

        let (_v, restored, _) = setup();
        restored.restore(manager.export());
        assert_eq!(restored.latest_published(&scope()).unwrap().id, first.id);
        let next = restored.create_staged(&scope(), draft()).unwrap();
        assert_eq!(next.id, 3);
        assert_eq!(next.snapshot_version_number, 3);
    }
}
