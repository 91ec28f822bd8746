//! Snapshot lifecycle endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::author_or_default;
use crate::catalog::{ApplicationId, EnvironmentId};
use crate::error::{ConfigResult, Violation};
use crate::http::server::AppState;
use crate::snapshots::{ConfigSnapshot, SnapshotComparison, SnapshotDraft, SnapshotStatistics};

type ScopePath = Path<(String, String)>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Explicit document to stage instead of the merged view.
    #[serde(default)]
    pub document: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorParams {
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSnapshot {
    pub target_snapshot_id: u64,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompareParams {
    pub left: u64,
    pub right: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub snapshot_id: u64,
    pub valid: bool,
    pub violations: Vec<Violation>,
}

pub async fn create_snapshot(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
    Json(body): Json<CreateSnapshot>,
) -> ConfigResult<(StatusCode, Json<ConfigSnapshot>)> {
    let draft = SnapshotDraft {
        name: body.name,
        description: body.description,
        author: author_or_default(body.author),
    };
    let snapshot = state.center.create_snapshot(
        &ApplicationId::from(app),
        &EnvironmentId::from(env),
        draft,
        body.document.as_ref(),
    )?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn list_snapshots(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
) -> ConfigResult<Json<Vec<ConfigSnapshot>>> {
    Ok(Json(state.center.list_snapshots(&app.into(), &env.into())?))
}

pub async fn published_snapshot(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
) -> ConfigResult<Json<ConfigSnapshot>> {
    Ok(Json(state.center.published_snapshot(&app.into(), &env.into())?))
}

pub async fn statistics(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
) -> ConfigResult<Json<SnapshotStatistics>> {
    Ok(Json(state.center.snapshot_statistics(&app.into(), &env.into())?))
}

pub async fn rollback_snapshot(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
    Json(body): Json<RollbackSnapshot>,
) -> ConfigResult<Json<ConfigSnapshot>> {
    let author = author_or_default(body.author);
    let snapshot = state.center.rollback_snapshot(
        &ApplicationId::from(app),
        &EnvironmentId::from(env),
        body.target_snapshot_id,
        &author,
    )?;
    Ok(Json(snapshot))
}

pub async fn get_snapshot(State(state): State<AppState>, Path(id): Path<u64>) -> ConfigResult<Json<ConfigSnapshot>> {
    Ok(Json(state.center.snapshots().get(id)?))
}

/// Dry run of the publish-time checks. Always 200 for an existing snapshot.
pub async fn validate_snapshot(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ConfigResult<Json<ValidationReport>> {
    let violations = state.center.snapshots().validate(id)?;
    Ok(Json(ValidationReport {
        snapshot_id: id,
        valid: violations.is_empty(),
        violations,
    }))
}

pub async fn publish_snapshot(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<AuthorParams>,
) -> ConfigResult<Json<ConfigSnapshot>> {
    let author = author_or_default(params.author);
    Ok(Json(state.center.publish_snapshot(id, &author)?))
}

pub async fn compare_snapshots(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> ConfigResult<Json<SnapshotComparison>> {
    Ok(Json(state.center.snapshots().compare(params.left, params.right)?))
}
