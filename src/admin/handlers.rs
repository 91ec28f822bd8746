use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::catalog::{ApplicationId, EnvironmentId};
use crate::error::ConfigResult;
use crate::http::server::AppState;
use crate::push::{ClientInfo, ConnectionId, ConnectionStats, DeliveryReport};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub applications: usize,
    pub online_clients: usize,
    pub clients_by_application: BTreeMap<ApplicationId, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAppRequest {
    pub application_id: String,
    #[serde(default)]
    pub environment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushInstancesRequest {
    pub application_id: String,
    pub environment_id: String,
    pub instance_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMessageRequest {
    pub instance_ids: Vec<String>,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParams {
    /// Defaults to the published snapshot's version.
    #[serde(default)]
    pub version_number: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisconnectParams {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let push = state.center.push();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        applications: state.center.catalog().list_applications().len(),
        online_clients: push.total_online(),
        clients_by_application: push.online_by_application().into_iter().collect(),
    })
}

pub async fn push_app(
    State(state): State<AppState>,
    Json(body): Json<PushAppRequest>,
) -> ConfigResult<Json<DeliveryReport>> {
    let app = ApplicationId::from(body.application_id);
    state.center.catalog().get_application(&app)?;
    let env = body.environment_id.map(EnvironmentId::from);
    Ok(Json(state.center.push_application(&app, env.as_ref())?))
}

pub async fn push_instances(
    State(state): State<AppState>,
    Json(body): Json<PushInstancesRequest>,
) -> ConfigResult<Json<DeliveryReport>> {
    let report = state.center.push_instances(
        &body.application_id.into(),
        &body.environment_id.into(),
        &body.instance_ids,
    )?;
    Ok(Json(report))
}

pub async fn push_snapshot(State(state): State<AppState>, Path(id): Path<u64>) -> ConfigResult<Json<DeliveryReport>> {
    Ok(Json(state.center.push_snapshot(id)?))
}

pub async fn notify_change(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
    Query(params): Query<NotificationParams>,
) -> ConfigResult<Json<DeliveryReport>> {
    let report = state
        .center
        .notify_change(&app.into(), &env.into(), params.version_number)?;
    Ok(Json(report))
}

pub async fn message_app(
    State(state): State<AppState>,
    Path(app): Path<String>,
    Json(body): Json<BroadcastRequest>,
) -> ConfigResult<Json<DeliveryReport>> {
    Ok(Json(state.center.message_application(&app.into(), &body.message)?))
}

pub async fn message_instances(
    State(state): State<AppState>,
    Json(body): Json<InstanceMessageRequest>,
) -> Json<DeliveryReport> {
    Json(state.center.push().message_instances(&body.instance_ids, &body.message))
}

pub async fn get_clients(State(state): State<AppState>, Path(app): Path<String>) -> Json<Vec<ClientInfo>> {
    Json(state.center.push().online_clients(&app.into()))
}

pub async fn get_stats(State(state): State<AppState>, Path(app): Path<String>) -> Json<ConnectionStats> {
    Json(state.center.push().stats(&app.into()))
}

pub async fn disconnect_client(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    Query(params): Query<DisconnectParams>,
) -> ConfigResult<Json<ClientInfo>> {
    let id: ConnectionId = connection_id.parse()?;
    let reason = params.reason.unwrap_or_else(|| "disconnected by administrator".to_string());
    Ok(Json(state.center.push().disconnect_with_reason(id, &reason)?))
}

pub async fn broadcast(State(state): State<AppState>, Json(body): Json<BroadcastRequest>) -> Json<DeliveryReport> {
    Json(state.center.push().broadcast(&body.message))
}
