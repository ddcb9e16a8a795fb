//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_sessions_created_total` (counter)
//! - `pipeline_sessions_expired_total` (counter): records removed by the sweep
//! - `pipeline_sessions_active` (gauge): live records after the last change
//! - `pipeline_resource_requests_total` (counter): by `outcome` (hit, not_modified, miss)
//! - `pipeline_dispatch_total` (counter): by `node` and `outcome`
//! - `pipeline_dispatch_duration_seconds` (histogram): handler wall time by `node`
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder
//!   every call is a no-op, so unit tests need no setup
//! - The Prometheus exporter is opt-in and owns its own listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(address = %address, "Prometheus exporter listening");
    Ok(())
}

pub fn record_session_created(active: usize) {
    metrics::counter!("pipeline_sessions_created_total").increment(1);
    metrics::gauge!("pipeline_sessions_active").set(active as f64);
}

pub fn record_sessions_expired(removed: usize, active: usize) {
    metrics::counter!("pipeline_sessions_expired_total").increment(removed as u64);
    metrics::gauge!("pipeline_sessions_active").set(active as f64);
}

/// `outcome` is one of `hit`, `not_modified`, `miss`.
pub fn record_resource(outcome: &'static str) {
    metrics::counter!("pipeline_resource_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch(node: &str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(
        "pipeline_dispatch_total",
        "node" => node.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("pipeline_dispatch_duration_seconds", "node" => node.to_string())
        .record(elapsed.as_secs_f64());
}
