pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/push/app", post(push_app))
        .route("/admin/push/instances", post(push_instances))
        .route("/admin/snapshots/{id}/push", post(push_snapshot))
        .route("/admin/apps/{app}/environments/{env}/notification", post(notify_change))
        .route("/admin/apps/{app}/message", post(message_app))
        .route("/admin/instances/message", post(message_instances))
        .route("/admin/apps/{app}/clients", get(get_clients))
        .route("/admin/apps/{app}/stats", get(get_stats))
        .route("/admin/clients/{connection_id}/disconnect", post(disconnect_client))
        .route("/admin/broadcast", post(broadcast))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
