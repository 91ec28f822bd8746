//! Service facade wiring catalog, versions, resolution, snapshots and push.
//!
//! HTTP handlers and the websocket loop talk to this type only. It adds the
//! cross-component checks (application writable, environment exists) that no
//! single component can make on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::catalog::{ApplicationId, Catalog, EnvironmentId, Scope};
use crate::config::PushConfig;
use crate::error::{ConfigCenterError, ConfigResult};
use crate::inheritance::{InheritanceResolver, ResolvedConfig};
use crate::push::{DeliveryReport, PushDistributor, ServerMessage};
use crate::snapshots::validation::validate_items;
use crate::snapshots::{
    parse_document, ConfigSnapshot, ImportFormat, PublishListener, SnapshotDraft, SnapshotManager, SnapshotStatistics,
    SnapshotStatus,
};
use crate::storage::PersistedState;
use crate::versioning::{ChangeType, ConfigDiff, ConfigItem, ConfigVersion, NewVersion, VersionStore};

/// Configuration as served to client runtimes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
    /// `published` when backed by a snapshot, `live` for the merged view.
    pub source: &'static str,
    pub snapshot_id: Option<u64>,
    pub version_number: Option<u64>,
    pub config: BTreeMap<String, String>,
}

/// Outcome of a file import into one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    /// Keys whose imported value equals the current one; no version written.
    pub unchanged: usize,
    pub versions: Vec<ConfigVersion>,
}

#[derive(Clone)]
pub struct ConfigCenter {
    catalog: Arc<Catalog>,
    versions: Arc<VersionStore>,
    resolver: InheritanceResolver,
    snapshots: Arc<SnapshotManager>,
    push: Arc<PushDistributor>,
}

impl ConfigCenter {
    pub fn new(push_config: PushConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let versions = Arc::new(VersionStore::new());
        let resolver = InheritanceResolver::new(catalog.clone(), versions.clone());
        let push = Arc::new(PushDistributor::new(push_config));
        let listener: Arc<dyn PublishListener> = push.clone();
        let snapshots = Arc::new(SnapshotManager::new(resolver.clone(), versions.clone()).with_listener(listener));

        Self {
            catalog,
            versions,
            resolver,
            snapshots,
            push,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn resolver(&self) -> &InheritanceResolver {
        &self.resolver
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn push(&self) -> &Arc<PushDistributor> {
        &self.push
    }

    /// Scope of an existing environment of a writable application.
    fn writable_scope(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Scope> {
        self.catalog.ensure_writable(app)?;
        Ok(self.catalog.get_environment(app, env)?.scope())
    }

    /// Scope of an existing environment; archived applications stay readable.
    fn readable_scope(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Scope> {
        Ok(self.catalog.get_environment(app, env)?.scope())
    }

    // --- items with version -------------------------------------------------

    pub fn create_item(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        key: &str,
        value: String,
        author: &str,
    ) -> ConfigResult<ConfigVersion> {
        let scope = self.writable_scope(app, env)?;
        self.versions.append(
            &scope,
            NewVersion {
                key: key.to_string(),
                value: Some(value),
                change_type: ChangeType::Create,
                author: author.to_string(),
            },
        )
    }

    /// Update an item. With `expected_version`, fails on a concurrent scope write.
    pub fn update_item(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        key: &str,
        value: String,
        author: &str,
        expected_version: Option<u64>,
    ) -> ConfigResult<ConfigVersion> {
        let scope = self.writable_scope(app, env)?;
        let request = NewVersion {
            key: key.to_string(),
            value: Some(value),
            change_type: ChangeType::Update,
            author: author.to_string(),
        };
        match expected_version {
            Some(expected) => self.versions.append_expecting(&scope, request, expected),
            None => self.versions.append(&scope, request),
        }
    }

    pub fn delete_item(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        key: &str,
        author: &str,
        expected_version: Option<u64>,
    ) -> ConfigResult<ConfigVersion> {
        let scope = self.writable_scope(app, env)?;
        let request = NewVersion {
            key: key.to_string(),
            value: None,
            change_type: ChangeType::Delete,
            author: author.to_string(),
        };
        match expected_version {
            Some(expected) => self.versions.append_expecting(&scope, request, expected),
            None => self.versions.append(&scope, request),
        }
    }

    pub fn rollback_item(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        key: &str,
        target_version: u64,
        author: &str,
    ) -> ConfigResult<ConfigVersion> {
        let scope = self.writable_scope(app, env)?;
        self.versions.rollback(&scope, key, target_version, author)
    }

    /// Write every key of a configuration file as item versions.
    ///
    /// The file is validated as a whole first (empty or duplicate keys, null
    /// placeholders); then new keys are created, changed keys updated and
    /// identical ones skipped, in one all-or-nothing batch.
    pub fn import_items(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        format: ImportFormat,
        content: &str,
        author: &str,
    ) -> ConfigResult<ImportReport> {
        let scope = self.writable_scope(app, env)?;
        let items = parse_document(format, content)?;
        let violations = validate_items(&items);
        if !violations.is_empty() {
            return Err(ConfigCenterError::ValidationFailed(violations));
        }

        let current = self.versions.current_items(&scope);
        let mut unchanged = 0;
        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let change_type = match current.get(&item.key) {
                Some(existing) if item.value.as_deref() == Some(existing.value.as_str()) => {
                    unchanged += 1;
                    continue;
                }
                Some(_) => ChangeType::Update,
                None => ChangeType::Create,
            };
            requests.push(NewVersion {
                key: item.key,
                value: item.value,
                change_type,
                author: author.to_string(),
            });
        }

        let versions = self.versions.append_batch(&scope, requests)?;
        let created = versions.iter().filter(|v| v.change_type == ChangeType::Create).count();
        let report = ImportReport {
            created,
            updated: versions.len() - created,
            unchanged,
            versions,
        };
        tracing::info!(
            scope = %scope,
            format = %format,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "Configuration file imported"
        );
        Ok(report)
    }

    /// Items defined directly on the environment, without inherited ones.
    pub fn items(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Vec<ConfigItem>> {
        let scope = self.readable_scope(app, env)?;
        Ok(self.versions.current_items(&scope).into_values().collect())
    }

    pub fn item_history(&self, app: &ApplicationId, env: &EnvironmentId, key: &str) -> ConfigResult<Vec<ConfigVersion>> {
        let scope = self.readable_scope(app, env)?;
        self.versions.history(&scope, key)
    }

    pub fn scope_versions(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Vec<ConfigVersion>> {
        let scope = self.readable_scope(app, env)?;
        Ok(self.versions.scope_history(&scope))
    }

    pub fn compare_versions(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        from: u64,
        to: u64,
    ) -> ConfigResult<ConfigDiff<String>> {
        let scope = self.readable_scope(app, env)?;
        self.versions.compare_versions(&scope, from, to)
    }

    // --- resolution ---------------------------------------------------------

    pub fn merged_config(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<ResolvedConfig> {
        self.resolver.resolve(app, env)
    }

    /// Published snapshot of the scope, or the live merged view before the first publish.
    pub fn client_config(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<ClientConfig> {
        let scope = self.readable_scope(app, env)?;
        if let Some(snapshot) = self.snapshots.latest_published(&scope) {
            return Ok(ClientConfig {
                application_id: app.clone(),
                environment_id: env.clone(),
                source: "published",
                snapshot_id: Some(snapshot.id),
                version_number: Some(snapshot.snapshot_version_number),
                config: snapshot.values(),
            });
        }

        let resolved = self.resolver.resolve(app, env)?;
        Ok(ClientConfig {
            application_id: app.clone(),
            environment_id: env.clone(),
            source: "live",
            snapshot_id: None,
            version_number: None,
            config: resolved.values(),
        })
    }

    // --- snapshots ----------------------------------------------------------

    /// Stage the merged view, or `document` when given.
    pub fn create_snapshot(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        draft: SnapshotDraft,
        document: Option<&serde_json::Value>,
    ) -> ConfigResult<ConfigSnapshot> {
        let scope = self.writable_scope(app, env)?;
        match document {
            Some(document) => self.snapshots.create_staged_from_document(&scope, document, draft),
            None => self.snapshots.create_staged(&scope, draft),
        }
    }

    pub fn publish_snapshot(&self, id: u64, author: &str) -> ConfigResult<ConfigSnapshot> {
        if let Ok(snapshot) = self.snapshots.get(id) {
            self.catalog.ensure_writable(&snapshot.application_id)?;
        }
        self.snapshots.publish(id, author)
    }

    pub fn rollback_snapshot(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        target: u64,
        author: &str,
    ) -> ConfigResult<ConfigSnapshot> {
        let scope = self.writable_scope(app, env)?;
        self.snapshots.rollback_to_snapshot(&scope, target, author)
    }

    pub fn list_snapshots(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Vec<ConfigSnapshot>> {
        let scope = self.readable_scope(app, env)?;
        Ok(self.snapshots.list(&scope))
    }

    pub fn snapshot_statistics(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<SnapshotStatistics> {
        let scope = self.readable_scope(app, env)?;
        Ok(self.snapshots.statistics(&scope))
    }

    pub fn published_snapshot(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<ConfigSnapshot> {
        let scope = self.readable_scope(app, env)?;
        self.snapshots
            .latest_published(&scope)
            .ok_or_else(|| ConfigCenterError::not_found("published snapshot", &scope))
    }

    // --- administrative push ------------------------------------------------

    fn update_message(snapshot: &ConfigSnapshot) -> ServerMessage {
        ServerMessage::ConfigUpdate {
            application_id: snapshot.application_id.clone(),
            environment_id: snapshot.environment_id.clone(),
            snapshot_id: snapshot.id,
            version_number: snapshot.snapshot_version_number,
            config: snapshot.values(),
            timestamp: Utc::now(),
        }
    }

    /// Re-push the published configuration of one environment, or of every
    /// environment of the application that has a published snapshot.
    pub fn push_application(&self, app: &ApplicationId, env: Option<&EnvironmentId>) -> ConfigResult<DeliveryReport> {
        let environments = match env {
            Some(env) => vec![self.catalog.get_environment(app, env)?],
            None => self.catalog.list_environments(app)?,
        };

        let mut total = DeliveryReport::default();
        for environment in environments {
            let Some(snapshot) = self.snapshots.latest_published(&environment.scope()) else {
                continue;
            };
            total += self.push.notify(app, &environment.id, &Self::update_message(&snapshot));
        }
        tracing::info!(app_id = %app, delivered = total.delivered, failed = total.failed, "Manual push to application");
        Ok(total)
    }

    /// Push one environment's published configuration to specific instances.
    pub fn push_instances(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        instance_ids: &[String],
    ) -> ConfigResult<DeliveryReport> {
        let snapshot = self.published_snapshot(app, env)?;
        let report = self.push.push_to_instances(instance_ids, &Self::update_message(&snapshot));
        tracing::info!(
            app_id = %app,
            env_id = %env,
            instances = instance_ids.len(),
            delivered = report.delivered,
            "Manual push to instances"
        );
        Ok(report)
    }

    /// Re-send a published or historical snapshot to its scope's subscribers,
    /// followed by a change notification. Drafts are never pushed.
    pub fn push_snapshot(&self, id: u64) -> ConfigResult<DeliveryReport> {
        let snapshot = self.snapshots.get(id)?;
        if !matches!(snapshot.status, SnapshotStatus::Published | SnapshotStatus::Superseded) {
            return Err(ConfigCenterError::InvalidSnapshotState {
                snapshot_id: id,
                state: snapshot.status.to_string(),
            });
        }

        let (app, env) = (&snapshot.application_id, &snapshot.environment_id);
        let mut report = self.push.notify(app, env, &Self::update_message(&snapshot));
        report += self.push.notify_change(app, env, snapshot.snapshot_version_number);
        tracing::info!(snapshot_id = id, app_id = %app, env_id = %env, delivered = report.delivered, "Manual snapshot push");
        Ok(report)
    }

    /// Send a change notification for the scope. Without an explicit version
    /// the published snapshot's version is announced.
    pub fn notify_change(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        version_number: Option<u64>,
    ) -> ConfigResult<DeliveryReport> {
        let version_number = match version_number {
            Some(version) => {
                self.readable_scope(app, env)?;
                version
            }
            None => self.published_snapshot(app, env)?.snapshot_version_number,
        };
        Ok(self.push.notify_change(app, env, version_number))
    }

    /// Free-text message to every client of one application.
    pub fn message_application(&self, app: &ApplicationId, text: &str) -> ConfigResult<DeliveryReport> {
        self.catalog.get_application(app)?;
        Ok(self.push.message_application(app, text))
    }

    // --- persistence --------------------------------------------------------

    pub fn export_state(&self) -> PersistedState {
        PersistedState {
            saved_at: Some(Utc::now()),
            applications: self.catalog.list_applications(),
            environments: self.catalog.all_environments(),
            versions: self.versions.export(),
            snapshots: self.snapshots.export(),
        }
    }

    pub fn restore_state(&self, state: PersistedState) {
        self.catalog.restore(state.applications, state.environments);
        self.versions.restore(state.versions);
        self.snapshots.restore(state.snapshots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> ConfigCenter {
        let center = ConfigCenter::new(PushConfig::default());
        center.catalog().create_application("shop".into(), "Shop").unwrap();
        center
            .catalog()
            .create_environment(&"shop".into(), "prod".into(), "Production", None)
            .unwrap();
        center
    }

    fn draft() -> SnapshotDraft {
        SnapshotDraft {
            author: "alice".into(),
            ..Default::default()
        }
    }

    #[test]
    fn client_config_prefers_published_snapshot() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));
        center.create_item(&app, &env, "timeout", "30".into(), "alice").unwrap();

        let live = center.client_config(&app, &env).unwrap();
        assert_eq!(live.source, "live");
        assert_eq!(live.config["timeout"], "30");

        let staged = center.create_snapshot(&app, &env, draft(), None).unwrap();
        center.publish_snapshot(staged.id, "alice").unwrap();
        center.update_item(&app, &env, "timeout", "60".into(), "alice", None).unwrap();

        let served = center.client_config(&app, &env).unwrap();
        assert_eq!(served.source, "published");
        assert_eq!(served.config["timeout"], "30");
    }

    #[test]
    fn archived_application_is_read_only() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));
        center.create_item(&app, &env, "timeout", "30".into(), "alice").unwrap();
        center.catalog().archive_application(&app).unwrap();

        assert!(center.create_item(&app, &env, "retries", "3".into(), "alice").is_err());
        assert_eq!(center.item_history(&app, &env, "timeout").unwrap().len(), 1);
    }

    #[test]
    fn writes_to_unknown_environment_fail() {
        let center = center();
        let err = center
            .create_item(&"shop".into(), &"nope".into(), "k", "v".into(), "alice")
            .unwrap_err();
        assert!(matches!(err, ConfigCenterError::NotFound { kind: "environment", .. }));
    }

    #[test]
    fn import_creates_updates_and_skips_unchanged() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));
        center.create_item(&app, &env, "timeout", "30".into(), "alice").unwrap();
        center.create_item(&app, &env, "region", "east".into(), "alice").unwrap();

        let report = center
            .import_items(&app, &env, ImportFormat::Properties, "timeout=45\nregion=east\ndb.host=db1\n", "bob")
            .unwrap();
        assert_eq!((report.created, report.updated, report.unchanged), (1, 1, 1));
        let numbers: Vec<u64> = report.versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![3, 4]);
        assert_eq!(center.merged_config(&app, &env).unwrap().values()["timeout"], "45");
    }

    #[test]
    fn import_with_violations_writes_nothing() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));

        let err = center
            .import_items(&app, &env, ImportFormat::Json, r#"{"a.b": 1, "a": {"b": 2}, "c": 3}"#, "bob")
            .unwrap_err();
        assert!(matches!(err, ConfigCenterError::ValidationFailed(_)));
        assert!(center.items(&app, &env).unwrap().is_empty());
    }

    #[test]
    fn drafts_cannot_be_pushed() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));
        center.create_item(&app, &env, "timeout", "30".into(), "alice").unwrap();
        let staged = center.create_snapshot(&app, &env, draft(), None).unwrap();

        assert!(matches!(
            center.push_snapshot(staged.id),
            Err(ConfigCenterError::InvalidSnapshotState { .. })
        ));
        center.publish_snapshot(staged.id, "alice").unwrap();
        assert_eq!(center.push_snapshot(staged.id).unwrap().recipients, 0);
    }

    #[test]
    fn notification_defaults_to_published_version() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));
        assert!(matches!(
            center.notify_change(&app, &env, None),
            Err(ConfigCenterError::NotFound { .. })
        ));
        assert!(center.notify_change(&app, &env, Some(7)).is_ok());
        assert!(center.notify_change(&app, &"nope".into(), Some(7)).is_err());
    }

    #[test]
    fn state_survives_export_and_restore() {
        let center = center();
        let (app, env) = (ApplicationId::from("shop"), EnvironmentId::from("prod"));
        center.create_item(&app, &env, "timeout", "30".into(), "alice").unwrap();
        let staged = center.create_snapshot(&app, &env, draft(), None).unwrap();
        center.publish_snapshot(staged.id, "alice").unwrap();

        let restored = ConfigCenter::new(PushConfig::default());
        restored.restore_state(center.export_state());

        assert_eq!(restored.merged_config(&app, &env).unwrap().values()["timeout"], "30");
        assert_eq!(restored.published_snapshot(&app, &env).unwrap().id, staged.id);
        let next = restored.create_item(&app, &env, "retries", "3".into(), "bob").unwrap();
        assert_eq!(next.version_number, 2);
    }
}
