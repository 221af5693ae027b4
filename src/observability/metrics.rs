//! Metrics collection and exposition.
//!
//! # Metrics
//! - `plugin_router_dispatch_total` (counter): dispatched requests by outcome
//! - `plugin_router_dispatch_duration_seconds` (histogram): dispatch latency by outcome
//! - `plugin_router_routes` (gauge): registered route keys
//! - `plugin_router_compile_total` (counter): dev-mode compilations by result
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are small fixed sets; no per-path labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of one dispatched request.
pub fn record_dispatch(outcome: &'static str, start: Instant) {
    ::metrics::counter!("plugin_router_dispatch_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("plugin_router_dispatch_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Publish the current number of registered route keys.
pub fn record_route_count(routes: usize) {
    ::metrics::gauge!("plugin_router_routes").set(routes as f64);
}

/// Record a development-mode compilation.
pub fn record_compile(result: &'static str) {
    ::metrics::counter!("plugin_router_compile_total", "result" => result).increment(1);
}
