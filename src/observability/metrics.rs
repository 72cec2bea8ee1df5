//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by method, route, status
//! - `router_request_duration_seconds` (histogram): latency distribution
//! - `router_reloads_total` (counter): hot reloads by outcome
//!
//! # Design Decisions
//! - Labels use the route pattern (`/users/:id`), never the raw path
//! - Without an installed recorder every update is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    ::metrics::counter!("router_requests_total", &labels).increment(1);
    ::metrics::histogram!("router_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!("router_reloads_total", "outcome" => outcome).increment(1);
}
