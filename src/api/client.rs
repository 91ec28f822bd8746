//! Read path used by client runtimes to reconcile after (re)connecting.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::catalog::{ApplicationId, EnvironmentId};
use crate::center::ClientConfig;
use crate::error::ConfigResult;
use crate::http::server::AppState;

pub async fn client_config(
    State(state): State<AppState>,
    Path((app, env)): Path<(String, String)>,
) -> ConfigResult<Json<ClientConfig>> {
    let config = state
        .center
        .client_config(&ApplicationId::from(app), &EnvironmentId::from(env))?;
    Ok(Json(config))
}
