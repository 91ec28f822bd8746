//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define service metrics (requests, versions, publishes, push delivery)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `config_center_http_requests_total` (counter): requests by method, status
//! - `config_center_http_request_duration_seconds` (histogram): latency distribution
//! - `config_center_versions_appended_total` (counter): by change type
//! - `config_center_snapshots_published_total` (counter)
//! - `config_center_push_deliveries_total` (counter): by outcome
//! - `config_center_online_clients` (gauge): registered push connections
//! - `config_center_connections_expired_total` (counter): liveness sweeps
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "config_center_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("config_center_http_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_version_appended(change_type: &str) {
    ::metrics::counter!("config_center_versions_appended_total", "change_type" => change_type.to_string()).increment(1);
}

pub fn record_snapshot_published() {
    ::metrics::counter!("config_center_snapshots_published_total").increment(1);
}

/// `outcome` is `delivered` or `failed`.
pub fn record_push_delivery(outcome: &'static str, count: u64) {
    if count > 0 {
        ::metrics::counter!("config_center_push_deliveries_total", "outcome" => outcome).increment(count);
    }
}

pub fn record_online_clients(count: usize) {
    ::metrics::gauge!("config_center_online_clients").set(count as f64);
}

pub fn record_connections_expired(count: u64) {
    ::metrics::counter!("config_center_connections_expired_total").increment(count);
}
