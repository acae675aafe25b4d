//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, route, status, outcome
//! - `switchyard_request_duration_seconds` (histogram): dispatch latency by method, route
//! - `switchyard_handler_faults_total` (counter): panicking handler chains
//! - `switchyard_timeouts_total` (counter): requests cut off at their deadline
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - `route` is the registered pattern, not the raw path, to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one dispatched request.
pub fn record_request(method: &str, route: &str, status: u16, outcome: &'static str, started: Instant) {
    counter!(
        "switchyard_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "switchyard_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_fault() {
    counter!("switchyard_handler_faults_total").increment(1);
}

pub fn record_timeout() {
    counter!("switchyard_timeouts_total").increment(1);
}
