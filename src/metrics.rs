//! Prometheus metrics for request gating and upload observability.
//!
//! Metrics are recorded through the `metrics` facade and exposed in Prometheus
//! text format by the in-process `GET /metrics` route, which renders the
//! [`PrometheusHandle`] returned from [`init_metrics`].
//!
//! # Available Metrics
//!
//! ## Counters
//! - `upload_gateway_http_requests_total` - Total HTTP requests
//!   (labels: method, endpoint, status_code, hostname, client_ip)
//! - `upload_gateway_signedurl_created_total` - Signed URLs issued
//!   (labels: hostname, client_ip)
//!
//! ## Histograms
//! - `upload_gateway_http_request_duration_seconds` - Request duration
//!   (labels: method, endpoint)
//!
//! Requests to the `/metrics` route itself are never recorded, so the
//! exposition endpoint does not feed its own counters.
//!
//! # Usage
//!
//! ```rust,ignore
//! use upload_gateway::metrics::{init_metrics, record_request};
//!
//! // Initialize once at startup; keep the handle for the exposition route
//! let handle = init_metrics()?;
//!
//! // Record in the instrumentation layer
//! record_request("POST", "/upload", "200", "example.com", "203.0.113.5");
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "upload_gateway_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str =
        "upload_gateway_http_request_duration_seconds";
    pub const SIGNEDURL_CREATED_TOTAL: &str = "upload_gateway_signedurl_created_total";
}

/// Initialize the Prometheus metrics recorder.
///
/// Installs the recorder as the process-wide metrics sink and returns the
/// handle used by the `/metrics` route to render the text exposition format.
/// Call once at startup, before the server begins accepting requests.
///
/// # Errors
///
/// Returns an error message if a recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;

    describe_counter!(
        names::HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests handled by the gateway"
    );
    describe_histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        names::SIGNEDURL_CREATED_TOTAL,
        "Total number of signed upload URLs created"
    );

    Ok(handle)
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a completed HTTP request.
pub fn record_request(method: &str, endpoint: &str, status_code: &str, hostname: &str, client_ip: &str) {
    counter!(names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status_code" => status_code.to_string(),
        "hostname" => hostname.to_string(),
        "client_ip" => client_ip.to_string())
    .increment(1);
}

/// Record HTTP request duration.
pub fn record_request_duration(method: &str, endpoint: &str, duration_secs: f64) {
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string())
    .record(duration_secs);
}

/// Record a successful signed-URL issuance.
///
/// Called by the signed-URL handler after the storage collaborator returns a
/// URL; denied and failed requests never reach this.
pub fn record_signed_url_created(hostname: &str, client_ip: &str) {
    counter!(names::SIGNEDURL_CREATED_TOTAL,
        "hostname" => hostname.to_string(),
        "client_ip" => client_ip.to_string())
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests verify the functions don't panic.
    // Counter values are asserted end-to-end in the integration tests,
    // which install a real Prometheus recorder.

    #[test]
    fn test_record_request() {
        // Should not panic even without a recorder installed
        record_request("POST", "/upload", "200", "localhost:8080", "203.0.113.5");
    }

    #[test]
    fn test_record_request_duration() {
        record_request_duration("POST", "/upload", 0.045);
    }

    #[test]
    fn test_record_signed_url_created() {
        record_signed_url_created("localhost:8080", "203.0.113.5");
    }
}
