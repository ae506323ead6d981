//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingress_requests_total` (counter): exchanges by outcome
//! - `ingress_wait_seconds` (histogram): time the ingress side spent waiting
//! - `correlation_cache_operations_total` (counter): cache ops by op, result
//! - `correlation_cache_entries` (gauge): pending exchanges held
//! - `response_write_failures_total` (counter): rejected writes by reason

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished exchange: `completed`, `timed_out` or `fire_and_forget`.
pub fn record_exchange(outcome: &'static str, waited: Duration) {
    ::metrics::counter!("ingress_requests_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("ingress_wait_seconds", "outcome" => outcome).record(waited.as_secs_f64());
}

pub fn record_cache_op(op: &'static str, result: &'static str) {
    ::metrics::counter!("correlation_cache_operations_total", "op" => op, "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    ::metrics::gauge!("correlation_cache_entries").set(entries as f64);
}

pub fn record_write_failure(reason: &'static str) {
    ::metrics::counter!("response_write_failures_total", "reason" => reason).increment(1);
}
