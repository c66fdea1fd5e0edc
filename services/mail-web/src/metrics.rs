//! Prometheus metrics exposition
//!
//! Metrics recorded by this binary:
//!
//! - `web_requests_total` (counter): labels `route`, `status`
//! - `web_request_duration_seconds` (histogram): label `route`
//! - `graph_api_errors_total` (counter): label `code`
//!
//! `token_acquisitions_total` and `token_acquisition_failures_total` are
//! emitted by `graph_auth::CredentialCache` into the same recorder.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Graph round trips dominate; a device code sign-in can hold a request for minutes.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("web_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Buckets make `web_request_duration_seconds` render as a histogram with
/// `_bucket` lines rather than the exporter's default summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed request against its matched route template.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "web_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("web_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

/// Record an OData error returned by Graph.
pub fn record_graph_error(code: &str) {
    metrics::counter!("graph_api_errors_total", "code" => code.to_string()).increment(1);
}

/// In-process counters surfaced by `/health`
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("/", 200, 0.05);
        record_graph_error("ErrorAccessDenied");
    }

    /// Isolated recorder/handle pair; `install_recorder()` can only run once
    /// per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/list-inbox", 200, 0.042);
        record_request("/", 404, 0.2);

        let output = handle.render();
        assert!(output.contains("web_requests_total"));
        assert!(output.contains("route=\"/list-inbox\""));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("status=\"404\""));
        assert!(
            output.contains("web_request_duration_seconds_bucket"),
            "histogram must render _bucket lines for histogram_quantile() queries"
        );
        assert!(output.contains("le=\"900\""), "device code wait must fit a bucket");
    }

    #[test]
    fn record_graph_error_labels_by_code() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_graph_error("ErrorAccessDenied");
        record_graph_error("ErrorItemNotFound");

        let output = handle.render();
        assert!(output.contains("graph_api_errors_total"));
        assert!(output.contains("code=\"ErrorAccessDenied\""));
        assert!(output.contains("code=\"ErrorItemNotFound\""));
    }
}
