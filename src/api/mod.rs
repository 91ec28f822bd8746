//! REST API over the config center.
//!
//! # Data Flow
//! ```text
//! /api/applications/...                    → applications.rs (catalog, resolution, drift)
//! /api/applications/{app}/environments/{env}/items/...
//!                                          → items.rs (versioned writes, history, rollback)
//! /api/applications/{app}/environments/{env}/import?format=json|yaml|properties
//!                                          → items.rs (file import as item versions)
//! /api/applications/{app}/environments/{env}/snapshots/...
//! /api/snapshots/...                       → snapshots.rs (stage, validate, publish, compare)
//! /api/client/configs/{app}/{env}          → client.rs (what runtimes read)
//! ```
//!
//! # Design Decisions
//! - Handlers hold no logic beyond parameter mapping; every rule lives in
//!   `ConfigCenter` and errors render through `ConfigCenterError: IntoResponse`
//! - Writes take the author from the body or `?author=`, defaulting to `system`

pub mod applications;
pub mod client;
pub mod items;
pub mod snapshots;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::http::server::AppState;

pub(crate) const DEFAULT_AUTHOR: &str = "system";

pub(crate) fn author_or_default(author: Option<String>) -> String {
    author
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
}

pub fn router() -> Router<AppState> {
    const ENV: &str = "/api/applications/{app}/environments/{env}";

    Router::new()
        // catalog
        .route(
            "/api/applications",
            get(applications::list_applications).post(applications::create_application),
        )
        .route(
            "/api/applications/{app}",
            get(applications::get_application).delete(applications::archive_application),
        )
        .route(
            "/api/applications/{app}/default-environment",
            put(applications::set_default_environment),
        )
        .route(
            "/api/applications/{app}/environments",
            get(applications::list_environments).post(applications::create_environment),
        )
        .route("/api/applications/{app}/differences", get(applications::differences))
        .route(&format!("{ENV}/parent"), put(applications::set_parent))
        // resolution
        .route(&format!("{ENV}/config"), get(applications::merged_config))
        .route(&format!("{ENV}/config/{{key}}"), get(applications::resolve_key))
        .route(&format!("{ENV}/chain"), get(applications::chain))
        // items
        .route(&format!("{ENV}/items"), get(items::list_items).post(items::create_item))
        .route(
            &format!("{ENV}/items/{{key}}"),
            put(items::update_item).delete(items::delete_item),
        )
        .route(&format!("{ENV}/items/{{key}}/history"), get(items::item_history))
        .route(&format!("{ENV}/items/{{key}}/rollback"), post(items::rollback_item))
        .route(&format!("{ENV}/import"), post(items::import_items))
        .route(&format!("{ENV}/versions"), get(items::scope_versions))
        .route(&format!("{ENV}/versions/compare"), get(items::compare_versions))
        // snapshots
        .route(
            &format!("{ENV}/snapshots"),
            get(snapshots::list_snapshots).post(snapshots::create_snapshot),
        )
        .route(&format!("{ENV}/snapshots/published"), get(snapshots::published_snapshot))
        .route(&format!("{ENV}/snapshots/statistics"), get(snapshots::statistics))
        .route(&format!("{ENV}/snapshots/rollback"), post(snapshots::rollback_snapshot))
        .route("/api/snapshots/compare", get(snapshots::compare_snapshots))
        .route("/api/snapshots/{id}", get(snapshots::get_snapshot))
        .route("/api/snapshots/{id}/validate", get(snapshots::validate_snapshot))
        .route("/api/snapshots/{id}/publish", post(snapshots::publish_snapshot))
        // client read path
        .route("/api/client/configs/{app}/{env}", get(client::client_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_author_falls_back_to_system() {
        assert_eq!(author_or_default(None), "system");
        assert_eq!(author_or_default(Some("  ".into())), "system");
        assert_eq!(author_or_default(Some("alice".into())), "alice");
    }
}
