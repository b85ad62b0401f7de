//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by service, method, status
//! - `gateway_rate_limited_total` (counter): requests refused with 429
//! - `gateway_access_denied_total` (counter): requests refused with 403, by list
//! - `gateway_services_loaded` (gauge): services in the active route table
//! - `gateway_reloads_total` (counter): reload attempts by outcome

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_request(service: &str, method: &str, status: u16) {
    counter!(
        "gateway_requests_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_access_denied(list: &'static str) {
    counter!("gateway_access_denied_total", "list" => list).increment(1);
}

pub fn record_services_loaded(count: usize) {
    gauge!("gateway_services_loaded").set(count as f64);
}

pub fn record_reload(outcome: &'static str) {
    counter!("gateway_reloads_total", "outcome" => outcome).increment(1);
}
