//! Prometheus metrics for dispatched requests.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `janus_requests_total` | Counter | `route`, `status` |
//! | `janus_request_duration_seconds` | Histogram | `route` |
//!
//! Recording goes through the `metrics` facade, so it is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Counter of dispatched requests.
pub const REQUESTS_TOTAL: &str = "janus_requests_total";

/// Histogram of dispatch latency.
pub const REQUEST_DURATION_SECONDS: &str = "janus_request_duration_seconds";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether metrics are recorded.
    pub enabled: bool,
    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Scrape output is available through [`render_metrics`].
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);

    describe_counter!(REQUESTS_TOTAL, "Total number of dispatched requests");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Dispatch latency in seconds"
    );

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if the recorder was not installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Records one dispatched request.
pub fn record_request(route: &str, status: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION_SECONDS, "route" => route.to_string())
        .record(duration.as_secs_f64());
}
