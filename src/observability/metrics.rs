//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, target service
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): rejections by bucket
//! - `gateway_security_findings_total` (counter): findings by category
//! - `gateway_upstream_requests_total` (counter): downstream calls by service, outcome
//! - `gateway_upstream_duration_seconds` (histogram): downstream latency
//! - `gateway_service_health` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_dropped_writes_total` (counter): background writes lost to a full queue

use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. The handle renders the `/metrics` body.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(bucket: &str) {
    counter!("gateway_rate_limited_total", "bucket" => bucket.to_string()).increment(1);
}

pub fn record_finding(category: &str) {
    counter!("gateway_security_findings_total", "category" => category.to_string()).increment(1);
}

pub fn record_upstream(service: &str, outcome: &str, start: Instant) {
    let labels = [
        ("service", service.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("gateway_upstream_requests_total", &labels).increment(1);
    histogram!("gateway_upstream_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_service_health(service: &str, healthy: bool) {
    gauge!("gateway_service_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_dropped_write(kind: &str) {
    counter!("gateway_dropped_writes_total", "kind" => kind.to_string()).increment(1);
}
