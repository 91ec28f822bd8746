//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use config_center::catalog::{ApplicationId, EnvironmentId};
use config_center::config::ServiceConfig;
use config_center::lifecycle::Shutdown;
use config_center::{ConfigCenter, HttpServer};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const ADMIN_KEY: &str = "test-admin-key";

/// A server on an ephemeral port, shut down when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub center: ConfigCenter,
    pub config_updates: mpsc::UnboundedSender<ServiceConfig>,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn admin(&self, client: &reqwest::Client, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        client
            .request(method, format!("{}{}", self.url(), path))
            .bearer_auth(ADMIN_KEY)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(configure: impl FnOnce(&mut ServiceConfig)) -> TestServer {
    let mut config = ServiceConfig::default();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.observability.metrics_enabled = false;
    configure(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config);
    let center = server.center().clone();
    let shutdown = Shutdown::new();
    let (config_updates, config_rx) = mpsc::unbounded_channel();

    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(e) = server.run(listener, config_rx, shutdown_rx).await {
            eprintln!("test server failed: {e}");
        }
    });

    TestServer {
        addr,
        center,
        config_updates,
        shutdown,
    }
}

/// `shop` with `prod` and `prod-east` (inherits from `prod`).
pub fn seed_shop(center: &ConfigCenter) {
    let app = ApplicationId::from("shop");
    center.catalog().create_application(app.clone(), "Shop").unwrap();
    center
        .catalog()
        .create_environment(&app, "prod".into(), "Production", None)
        .unwrap();
    center
        .catalog()
        .create_environment(&app, "prod-east".into(), "Production East", Some(EnvironmentId::from("prod")))
        .unwrap();
}

/// Poll `check` until it holds or the timeout expires.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
