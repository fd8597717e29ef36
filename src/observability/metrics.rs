//! Metrics collection and exposition.
//!
//! # Metrics
//! - `app_requests_total` (counter): requests by method, status, route
//! - `app_request_duration_seconds` (histogram): dispatch latency by route
//! - `app_failures_total` (counter): classified failures by kind
//! - `app_xsrf_rejections_total` (counter): guard rejections by reason
//! - `app_template_compiles_total` (counter): template lookups by cache hit
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its own scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, elapsed: Duration) {
    metrics::counter!(
        "app_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("app_request_duration_seconds", "route" => route.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_failure(kind: &'static str) {
    metrics::counter!("app_failures_total", "kind" => kind).increment(1);
}

pub fn record_xsrf_rejection(reason: &'static str) {
    metrics::counter!("app_xsrf_rejections_total", "reason" => reason).increment(1);
}

pub fn record_template_compile(cached: bool) {
    let cached = if cached { "true" } else { "false" };
    metrics::counter!("app_template_compiles_total", "cached" => cached).increment(1);
}
