//! Versioned item endpoints.
//!
//! Every write returns the `ConfigVersion` it appended. `PUT` and `DELETE`
//! accept `?expectedVersion=N` for optimistic concurrency; a stale value
//! answers 409 `VERSION_CONFLICT` and the caller decides whether to retry.
//!
//! `POST …/import?format=` takes the raw file as the request body.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::author_or_default;
use crate::catalog::{ApplicationId, EnvironmentId};
use crate::center::ImportReport;
use crate::error::ConfigResult;
use crate::http::server::AppState;
use crate::snapshots::ImportFormat;
use crate::versioning::{ConfigDiff, ConfigItem, ConfigVersion};

type ScopePath = Path<(String, String)>;
type ItemPath = Path<(String, String, String)>;

fn ids(app: String, env: String) -> (ApplicationId, EnvironmentId) {
    (app.into(), env.into())
}

#[derive(Debug, Deserialize)]
pub struct CreateItem {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    pub value: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteParams {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackItem {
    pub target_version: u64,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    pub format: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompareParams {
    pub from: u64,
    pub to: u64,
}

pub async fn list_items(State(state): State<AppState>, Path((app, env)): ScopePath) -> ConfigResult<Json<Vec<ConfigItem>>> {
    let (app, env) = ids(app, env);
    Ok(Json(state.center.items(&app, &env)?))
}

pub async fn create_item(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
    Json(body): Json<CreateItem>,
) -> ConfigResult<(StatusCode, Json<ConfigVersion>)> {
    let (app, env) = ids(app, env);
    let author = author_or_default(body.author);
    let version = state.center.create_item(&app, &env, &body.key, body.value, &author)?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path((app, env, key)): ItemPath,
    Query(params): Query<WriteParams>,
    Json(body): Json<UpdateItem>,
) -> ConfigResult<Json<ConfigVersion>> {
    let (app, env) = ids(app, env);
    let author = author_or_default(body.author.or(params.author));
    let version = state
        .center
        .update_item(&app, &env, &key, body.value, &author, params.expected_version)?;
    Ok(Json(version))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path((app, env, key)): ItemPath,
    Query(params): Query<WriteParams>,
) -> ConfigResult<Json<ConfigVersion>> {
    let (app, env) = ids(app, env);
    let author = author_or_default(params.author);
    let version = state
        .center
        .delete_item(&app, &env, &key, &author, params.expected_version)?;
    Ok(Json(version))
}

pub async fn item_history(
    State(state): State<AppState>,
    Path((app, env, key)): ItemPath,
) -> ConfigResult<Json<Vec<ConfigVersion>>> {
    let (app, env) = ids(app, env);
    Ok(Json(state.center.item_history(&app, &env, &key)?))
}

pub async fn rollback_item(
    State(state): State<AppState>,
    Path((app, env, key)): ItemPath,
    Json(body): Json<RollbackItem>,
) -> ConfigResult<Json<ConfigVersion>> {
    let (app, env) = ids(app, env);
    let author = author_or_default(body.author);
    let version = state
        .center
        .rollback_item(&app, &env, &key, body.target_version, &author)?;
    Ok(Json(version))
}

pub async fn scope_versions(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
) -> ConfigResult<Json<Vec<ConfigVersion>>> {
    let (app, env) = ids(app, env);
    Ok(Json(state.center.scope_versions(&app, &env)?))
}

pub async fn compare_versions(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
    Query(params): Query<CompareParams>,
) -> ConfigResult<Json<ConfigDiff<String>>> {
    let (app, env) = ids(app, env);
    Ok(Json(state.center.compare_versions(&app, &env, params.from, params.to)?))
}

pub async fn import_items(
    State(state): State<AppState>,
    Path((app, env)): ScopePath,
    Query(params): Query<ImportParams>,
    body: String,
) -> ConfigResult<Json<ImportReport>> {
    let (app, env) = ids(app, env);
    let format: ImportFormat = params.format.parse()?;
    let author = author_or_default(params.author);
    Ok(Json(state.center.import_items(&app, &env, format, &body, &author)?))
}
