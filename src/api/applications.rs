//! Catalog, resolution and drift endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::catalog::{Application, ApplicationId, Environment, EnvironmentId};
use crate::error::ConfigResult;
use crate::http::server::AppState;
use crate::inheritance::{DriftReport, ResolvedConfig, ResolvedValue};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplication {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_environment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetParent {
    /// `null` detaches the environment into a root.
    #[serde(default)]
    pub parent_environment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDefaultEnvironment {
    pub environment_id: String,
}

pub async fn create_application(
    State(state): State<AppState>,
    Json(body): Json<CreateApplication>,
) -> ConfigResult<(StatusCode, Json<Application>)> {
    let app = state.center.catalog().create_application(body.id.into(), body.name)?;
    Ok((StatusCode::CREATED, Json(app)))
}

pub async fn list_applications(State(state): State<AppState>) -> Json<Vec<Application>> {
    Json(state.center.catalog().list_applications())
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ConfigResult<Json<Application>> {
    Ok(Json(state.center.catalog().get_application(&app.into())?))
}

/// Soft delete: the application becomes read-only.
pub async fn archive_application(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ConfigResult<Json<Application>> {
    Ok(Json(state.center.catalog().archive_application(&app.into())?))
}

pub async fn set_default_environment(
    State(state): State<AppState>,
    Path(app): Path<String>,
    Json(body): Json<SetDefaultEnvironment>,
) -> ConfigResult<Json<Application>> {
    let app = state
        .center
        .catalog()
        .set_default_environment(&app.into(), &body.environment_id.into())?;
    Ok(Json(app))
}

pub async fn list_environments(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ConfigResult<Json<Vec<Environment>>> {
    Ok(Json(state.center.catalog().list_environments(&app.into())?))
}

pub async fn create_environment(
    State(state): State<AppState>,
    Path(app): Path<String>,
    Json(body): Json<CreateEnvironment>,
) -> ConfigResult<(StatusCode, Json<Environment>)> {
    let env = state.center.catalog().create_environment(
        &app.into(),
        body.id.into(),
        body.name,
        body.parent_environment_id.map(EnvironmentId::from),
    )?;
    Ok((StatusCode::CREATED, Json(env)))
}

pub async fn set_parent(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
    Json(body): Json<SetParent>,
) -> ConfigResult<Json<Environment>> {
    let env = state.center.catalog().set_parent(
        &app.into(),
        &env.into(),
        body.parent_environment_id.map(EnvironmentId::from),
    )?;
    Ok(Json(env))
}

pub async fn merged_config(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
) -> ConfigResult<Json<ResolvedConfig>> {
    Ok(Json(state.center.merged_config(&app.into(), &env.into())?))
}

pub async fn resolve_key(
    State(state): State<AppState>,
    Path((app, env, key)): Path<(String, String, String)>,
) -> ConfigResult<Json<ResolvedValue>> {
    let app = ApplicationId::from(app);
    let env = EnvironmentId::from(env);
    Ok(Json(state.center.resolver().resolve_key(&app, &env, &key)?))
}

/// Ancestor chain, root first.
pub async fn chain(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
) -> ConfigResult<Json<Vec<EnvironmentId>>> {
    Ok(Json(state.center.catalog().environment_chain(&app.into(), &env.into())?))
}

pub async fn differences(
    State(state): State<AppState>,
    Path(app): Path<String>,
) -> ConfigResult<Json<DriftReport>> {
    Ok(Json(state.center.resolver().compute_differences(&app.into())?))
}
