//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_observer_request_duration_seconds` (histogram): correlated
//!   start/stop durations, labelled by host
//! - `http_observer_orphan_stops_total` (counter): stops with no live start
//! - `http_observer_stale_records_total` (counter): starts swept before a stop
//! - `http_observer_upstream_requests_total` (counter): outbound calls by
//!   status

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request_duration(host: &str, elapsed: Duration) {
    metrics::histogram!("http_observer_request_duration_seconds", "host" => host.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_orphan_stop() {
    metrics::counter!("http_observer_orphan_stops_total").increment(1);
}

pub fn record_stale_records(count: usize) {
    metrics::counter!("http_observer_stale_records_total").increment(count as u64);
}

pub fn record_upstream_request(status: &str) {
    metrics::counter!("http_observer_upstream_requests_total", "status" => status.to_string())
        .increment(1);
}
