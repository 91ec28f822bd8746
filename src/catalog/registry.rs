//! Application and environment registry.
//!
//! # Responsibilities
//! - Own applications and their environment forests
//! - Reject parent links that would make an environment its own ancestor
//! - Compute root-first ancestor chains for the resolver
//!
//! # Design Decisions
//! - One `RwLock` per application: topology edits never block other applications
//! - Chains are computed as explicit ancestor lists guarded by a visited set

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::catalog::types::{Application, ApplicationId, Environment, EnvironmentId};
use crate::error::{ConfigCenterError, ConfigResult};

#[derive(Debug)]
struct ApplicationEntry {
    application: Application,
    environments: BTreeMap<EnvironmentId, Environment>,
}

/// Thread-safe registry of applications and environments.
#[derive(Debug, Default)]
pub struct Catalog {
    applications: DashMap<ApplicationId, Arc<RwLock<ApplicationEntry>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, app: &ApplicationId) -> ConfigResult<Arc<RwLock<ApplicationEntry>>> {
        self.applications
            .get(app)
            .map(|r| r.value().clone())
            .ok_or_else(|| ConfigCenterError::not_found("application", app))
    }

    /// Register a new application.
    pub fn create_application(&self, id: ApplicationId, name: impl Into<String>) -> ConfigResult<Application> {
        let application = Application {
            id: id.clone(),
            name: name.into(),
            default_environment_id: None,
            created_at: Utc::now(),
            archived_at: None,
        };

        match self.applications.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ConfigCenterError::already_exists("application", &id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(ApplicationEntry {
                    application: application.clone(),
                    environments: BTreeMap::new(),
                })));
                tracing::info!(app_id = %id, "Application created");
                Ok(application)
            }
        }
    }

    pub fn get_application(&self, id: &ApplicationId) -> ConfigResult<Application> {
        Ok(self.entry(id)?.read().application.clone())
    }

    pub fn list_applications(&self) -> Vec<Application> {
        let mut apps: Vec<Application> = self
            .applications
            .iter()
            .map(|r| r.value().read().application.clone())
            .collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        apps
    }

    /// Soft-delete: history and snapshots stay readable, new writes are rejected.
    pub fn archive_application(&self, id: &ApplicationId) -> ConfigResult<Application> {
        let entry = self.entry(id)?;
        let mut guard = entry.write();
        if guard.application.archived_at.is_none() {
            guard.application.archived_at = Some(Utc::now());
            tracing::info!(app_id = %id, "Application archived");
        }
        Ok(guard.application.clone())
    }

    /// Fails unless the application exists and is not archived.
    pub fn ensure_writable(&self, id: &ApplicationId) -> ConfigResult<()> {
        let entry = self.entry(id)?;
        let guard = entry.read();
        if guard.application.is_archived() {
            return Err(ConfigCenterError::not_found("application", id));
        }
        Ok(())
    }

    pub fn set_default_environment(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Application> {
        let entry = self.entry(app)?;
        let mut guard = entry.write();
        if !guard.environments.contains_key(env) {
            return Err(ConfigCenterError::not_found("environment", env));
        }
        guard.application.default_environment_id = Some(env.clone());
        Ok(guard.application.clone())
    }

    /// Create an environment under `app`, optionally inheriting from `parent`.
    pub fn create_environment(
        &self,
        app: &ApplicationId,
        id: EnvironmentId,
        name: impl Into<String>,
        parent: Option<EnvironmentId>,
    ) -> ConfigResult<Environment> {
        let entry = self.entry(app)?;
        let mut guard = entry.write();
        if guard.application.is_archived() {
            return Err(ConfigCenterError::not_found("application", app));
        }
        if guard.environments.contains_key(&id) {
            return Err(ConfigCenterError::already_exists("environment", &id));
        }
        if let Some(parent) = &parent {
            check_parent_candidate(&guard.environments, &id, parent)?;
        }

        let environment = Environment {
            id: id.clone(),
            application_id: app.clone(),
            name: name.into(),
            parent_environment_id: parent,
            created_at: Utc::now(),
        };
        guard.environments.insert(id.clone(), environment.clone());
        tracing::info!(
            app_id = %app,
            env_id = %id,
            parent = ?environment.parent_environment_id,
            "Environment created"
        );
        Ok(environment)
    }

    /// Re-parent an environment. State is untouched when the check fails.
    pub fn set_parent(
        &self,
        app: &ApplicationId,
        env: &EnvironmentId,
        parent: Option<EnvironmentId>,
    ) -> ConfigResult<Environment> {
        let entry = self.entry(app)?;
        let mut guard = entry.write();
        if !guard.environments.contains_key(env) {
            return Err(ConfigCenterError::not_found("environment", env));
        }
        if let Some(parent) = &parent {
            check_parent_candidate(&guard.environments, env, parent)?;
        }

        let environment = guard
            .environments
            .get_mut(env)
            .ok_or_else(|| ConfigCenterError::not_found("environment", env))?;
        environment.parent_environment_id = parent;
        tracing::info!(app_id = %app, env_id = %env, parent = ?environment.parent_environment_id, "Environment re-parented");
        Ok(environment.clone())
    }

    pub fn get_environment(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Environment> {
        let entry = self.entry(app)?;
        let guard = entry.read();
        guard
            .environments
            .get(env)
            .cloned()
            .ok_or_else(|| ConfigCenterError::not_found("environment", env))
    }

    /// Environments of `app` in id order.
    pub fn list_environments(&self, app: &ApplicationId) -> ConfigResult<Vec<Environment>> {
        let entry = self.entry(app)?;
        let guard = entry.read();
        Ok(guard.environments.values().cloned().collect())
    }

    /// Ancestor chain of `env`, ordered root first and ending with `env` itself.
    pub fn environment_chain(&self, app: &ApplicationId, env: &EnvironmentId) -> ConfigResult<Vec<EnvironmentId>> {
        let entry = self.entry(app)?;
        let guard = entry.read();
        ancestor_chain(&guard.environments, env)
    }

    /// Baseline environment for drift reports.
    pub fn default_environment(&self, app: &ApplicationId) -> ConfigResult<Option<EnvironmentId>> {
        let entry = self.entry(app)?;
        let guard = entry.read();
        if let Some(default) = &guard.application.default_environment_id {
            return Ok(Some(default.clone()));
        }
        Ok(guard
            .environments
            .values()
            .find(|e| e.parent_environment_id.is_none())
            .map(|e| e.id.clone()))
    }

    /// Insert previously persisted records without re-running creation checks.
    pub fn restore(&self, applications: Vec<Application>, environments: Vec<Environment>) {
        for application in applications {
            self.applications.insert(
                application.id.clone(),
                Arc::new(RwLock::new(ApplicationEntry {
                    application,
                    environments: BTreeMap::new(),
                })),
            );
        }
        for environment in environments {
            match self.applications.get(&environment.application_id) {
                Some(entry) => {
                    entry.write().environments.insert(environment.id.clone(), environment);
                }
                None => tracing::warn!(
                    app_id = %environment.application_id,
                    env_id = %environment.id,
                    "Dropping environment of unknown application"
                ),
            }
        }
    }

    /// Every environment across all applications.
    pub fn all_environments(&self) -> Vec<Environment> {
        self.applications
            .iter()
            .flat_map(|r| r.value().read().environments.values().cloned().collect::<Vec<_>>())
            .collect()
    }
}

/// Walk from `parent` to its root; fail if `env` is met on the way.
fn check_parent_candidate(
    environments: &BTreeMap<EnvironmentId, Environment>,
    env: &EnvironmentId,
    parent: &EnvironmentId,
) -> ConfigResult<()> {
    let mut path = vec![env.to_string()];
    let mut visited = HashSet::new();
    let mut current = Some(parent.clone());

    while let Some(id) = current {
        path.push(id.to_string());
        if &id == env || !visited.insert(id.clone()) {
            return Err(ConfigCenterError::CyclicInheritance { chain: path });
        }
        current = environments
            .get(&id)
            .ok_or_else(|| ConfigCenterError::not_found("environment", &id))?
            .parent_environment_id
            .clone();
    }
    Ok(())
}

fn ancestor_chain(
    environments: &BTreeMap<EnvironmentId, Environment>,
    env: &EnvironmentId,
) -> ConfigResult<Vec<EnvironmentId>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(env.clone());

    while let Some(id) = current {
        if !visited.insert(id.clone()) {
            let mut cycle: Vec<String> = chain.iter().map(ToString::to_string).collect();
            cycle.push(id.to_string());
            return Err(ConfigCenterError::CyclicInheritance { chain: cycle });
        }
        let environment = environments
            .get(&id)
            .ok_or_else(|| ConfigCenterError::not_found("environment", &id))?;
        current = environment.parent_environment_id.clone();
        chain.push(id);
    }

    chain.reverse();
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_prod() -> Catalog {
        let catalog = Catalog::new();
        catalog.create_application("shop".into(), "Shop").unwrap();
        catalog.create_environment(&"shop".into(), "prod".into(), "Production", None).unwrap();
        catalog
            .create_environment(&"shop".into(), "prod-east".into(), "Production East", Some("prod".into()))
            .unwrap();
        catalog
    }

    #[test]
    fn chain_is_root_first() {
        let catalog = catalog_with_prod();
        catalog
            .create_environment(&"shop".into(), "prod-east-1".into(), "East 1", Some("prod-east".into()))
            .unwrap();

        let chain = catalog.environment_chain(&"shop".into(), &"prod-east-1".into()).unwrap();
        let ids: Vec<&str> = chain.iter().map(EnvironmentId::as_str).collect();
        assert_eq!(ids, vec!["prod", "prod-east", "prod-east-1"]);
    }

    #[test]
    fn self_parent_is_rejected_on_create() {
        let catalog = catalog_with_prod();
        let err = catalog
            .create_environment(&"shop".into(), "qa".into(), "QA", Some("qa".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigCenterError::CyclicInheritance { .. }));
        assert!(catalog.get_environment(&"shop".into(), &"qa".into()).is_err());
    }

    #[test]
    fn reparent_into_descendant_is_rejected_without_mutation() {
        let catalog = catalog_with_prod();

        let err = catalog
            .set_parent(&"shop".into(), &"prod".into(), Some("prod-east".into()))
            .unwrap_err();
        match err {
            ConfigCenterError::CyclicInheritance { chain } => {
                assert_eq!(chain, vec!["prod", "prod-east", "prod"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let prod = catalog.get_environment(&"shop".into(), &"prod".into()).unwrap();
        assert_eq!(prod.parent_environment_id, None);
    }

    #[test]
    fn parent_must_exist() {
        let catalog = catalog_with_prod();
        let err = catalog
            .create_environment(&"shop".into(), "dev".into(), "Dev", Some("missing".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigCenterError::NotFound { kind: "environment", .. }));
    }

    #[test]
    fn restored_cycle_is_detected_defensively() {
        let catalog = Catalog::new();
        let now = Utc::now();
        let env = |id: &str, parent: &str| Environment {
            id: id.into(),
            application_id: "shop".into(),
            name: id.to_string(),
            parent_environment_id: Some(parent.into()),
            created_at: now,
        };
        catalog.restore(
            vec![Application {
                id: "shop".into(),
                name: "Shop".into(),
                default_environment_id: None,
                created_at: now,
                archived_at: None,
            }],
            vec![env("a", "b"), env("b", "a")],
        );

        let err = catalog.environment_chain(&"shop".into(), &"a".into()).unwrap_err();
        assert!(matches!(err, ConfigCenterError::CyclicInheritance { .. }));
    }

    #[test]
    fn default_environment_falls_back_to_first_root() {
        let catalog = catalog_with_prod();
        assert_eq!(
            catalog.default_environment(&"shop".into()).unwrap(),
            Some("prod".into())
        );

        catalog.set_default_environment(&"shop".into(), &"prod-east".into()).unwrap();
        assert_eq!(
            catalog.default_environment(&"shop".into()).unwrap(),
            Some("prod-east".into())
        );
    }

    #[test]
    fn archived_application_rejects_writes() {
        let catalog = catalog_with_prod();
        catalog.archive_application(&"shop".into()).unwrap();

        assert!(catalog.ensure_writable(&"shop".into()).is_err());
        assert!(catalog.get_application(&"shop".into()).unwrap().is_archived());
    }
}
