//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers (REST API, admin, websocket)
//! - Wire up middleware (tracing, limits, request ID, metrics)
//! - Bind server to listener
//! - Apply hot-reloaded push policy
//! - Drain push clients on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::api;
use crate::center::ConfigCenter;
use crate::config::ServiceConfig;
use crate::http::request::{make_span, track_requests, MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::websocket::ws_handler;
use crate::push::LivenessMonitor;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub center: ConfigCenter,
    pub config: Arc<ServiceConfig>,
}

/// HTTP server for the config center.
pub struct HttpServer {
    router: Router,
    config: Arc<ServiceConfig>,
    center: ConfigCenter,
}

impl HttpServer {
    /// Create a new HTTP server with an empty config center.
    pub fn new(config: ServiceConfig) -> Self {
        let center = ConfigCenter::new(config.push.clone());
        Self::with_center(config, center)
    }

    /// Create a server around an existing (e.g. restored) config center.
    pub fn with_center(config: ServiceConfig, center: ConfigCenter) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            center: center.clone(),
            config: config.clone(),
        };
        let router = Self::build_router(&config, state);
        Self { router, config, center }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/health", get(health))
            .route("/ws", get(ws_handler))
            .merge(api::router());

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state.clone()));
        }

        router
            .with_state(state)
            .layer(middleware::from_fn(track_requests))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
    }

    pub fn center(&self) -> &ConfigCenter {
        &self.center
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Valid config reloads arriving on `config_updates` swap the push policy.
    /// Returns once `shutdown` fires and in-flight requests have drained.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let monitor = LivenessMonitor::new(self.center.push().clone());
        tokio::spawn(monitor.run(shutdown.resubscribe()));

        let reload_center = self.center.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(new_config) => reload_center.push().update_policy(new_config.push),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let center = self.center.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                let closed = center.push().disconnect_all("server shutting down");
                tracing::info!(push_clients = closed, "Shutdown signal received, draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "onlineClients": state.center.push().total_online(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_carries_request_id() {
        let server = HttpServer::new(ServiceConfig::default());
        let response = server
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn admin_routes_absent_unless_enabled() {
        let server = HttpServer::new(ServiceConfig::default());
        let response = server
            .router
            .clone()
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let server = HttpServer::new(ServiceConfig::default());
        let response = server
            .router
            .clone()
            .oneshot(Request::get("/api/applications/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
