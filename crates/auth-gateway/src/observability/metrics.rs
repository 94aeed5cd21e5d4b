//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gateway_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: request method, unknown methods collapse to "OTHER"
//! - `endpoint`: 4 values (`/health`, `/ready`, `/metrics`, `/verify`)
//! - `outcome`: 2 values (verified, rejected)
//! - `error_code`: bounded by the error code enum, plus "none"
//! - `trigger`: 3 values (initial, expired, unknown_kid)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Histogram buckets for request and verification latency.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
];

/// Histogram buckets for key-set fetches (bounded by the fetch timeout).
const FETCH_BUCKETS: &[f64] = &[0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000];

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_http_request".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_token_verification".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| format!("Failed to set token verification buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_jwks_fetch".to_string()),
            FETCH_BUCKETS,
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gateway_http_requests_total`, `gateway_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures every response, including 405s produced before verification.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let method = normalize_method(method);
    let endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gateway_http_request_duration_seconds",
        "method" => method,
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gateway_http_requests_total",
        "method" => method,
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_method(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        _ => "OTHER",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Every path other than the operational ones is served by the verifier.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "/verify",
    }
}

// ============================================================================
// Token Verification Metrics
// ============================================================================

/// Record a token verification
///
/// Metric: `gateway_token_verifications_total`, `gateway_token_verification_duration_seconds`
/// Labels: `outcome`, `error_code`
pub fn record_token_verification(outcome: &str, error_code: Option<&str>, duration: Duration) {
    histogram!("gateway_token_verification_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gateway_token_verifications_total",
        "outcome" => outcome.to_string(),
        "error_code" => error_code.unwrap_or("none").to_string()
    )
    .increment(1);
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a key-set fetch attempt
///
/// Metric: `gateway_jwks_fetches_total`, `gateway_jwks_fetch_duration_seconds`
/// Labels: `trigger`, `status`
pub fn record_jwks_fetch(trigger: &str, status: &str, duration: Duration) {
    histogram!("gateway_jwks_fetch_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gateway_jwks_fetches_total",
        "trigger" => trigger.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an unknown-kid refetch skipped because of the cooldown
///
/// Metric: `gateway_jwks_refetch_suppressed_total`
pub fn record_jwks_refetch_suppressed() {
    counter!("gateway_jwks_refetch_suppressed_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(405), "error");
        assert_eq!(categorize_status_code(503), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/"), "/verify");
        assert_eq!(normalize_endpoint("/api/anything/123"), "/verify");
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method("GET"), "GET");
        assert_eq!(normalize_method("PROPFIND"), "OTHER");
    }

    #[test]
    fn test_recorded_metric_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_http_request("GET", "/", 200, Duration::from_millis(3));
            record_token_verification("rejected", Some("TOKEN_EXPIRED"), Duration::from_millis(1));
            record_jwks_fetch("unknown_kid", "success", Duration::from_millis(40));
            record_jwks_refetch_suppressed();
            record_jwks_refetch_suppressed();
        });

        let metrics = snapshotter.snapshot().into_vec();
        let names: Vec<String> = metrics
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "gateway_http_requests_total",
            "gateway_http_request_duration_seconds",
            "gateway_token_verifications_total",
            "gateway_token_verification_duration_seconds",
            "gateway_jwks_fetches_total",
            "gateway_jwks_fetch_duration_seconds",
            "gateway_jwks_refetch_suppressed_total",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }

        let suppressed = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "gateway_jwks_refetch_suppressed_total")
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(suppressed, Some(&DebugValue::Counter(2)));
    }
}
