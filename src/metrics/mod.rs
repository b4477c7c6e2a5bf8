//! Metrics module
//!
//! Prometheus metrics for authentication, key fetches and HTTP traffic.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "chat_gate_auth_attempts_total",
        "Authentication attempts by token source and outcome",
        &["source", "outcome"]
    ).unwrap();

    pub static ref AUTH_DURATION: HistogramVec = register_histogram_vec!(
        "chat_gate_auth_duration_seconds",
        "Time spent authenticating a request",
        &["source"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    // Key set metrics
    pub static ref KEY_FETCHES: CounterVec = register_counter_vec!(
        "chat_gate_jwks_fetches_total",
        "Key set fetches from the issuer",
        &["status"]
    ).unwrap();

    // HTTP metrics
    pub static ref HTTP_REQUESTS: CounterVec = register_counter_vec!(
        "chat_gate_http_requests_total",
        "HTTP requests by route and status code",
        &["route", "status"]
    ).unwrap();
}

/// Record authentication attempt
///
/// `outcome` is `"success"` or an [`AuthError::kind`](crate::auth::AuthError::kind) label.
pub fn record_auth_attempt(source: &str, outcome: &str, duration_secs: f64) {
    AUTH_ATTEMPTS.with_label_values(&[source, outcome]).inc();
    AUTH_DURATION
        .with_label_values(&[source])
        .observe(duration_secs);
}

/// Record a key set fetch
pub fn record_key_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    KEY_FETCHES.with_label_values(&[status]).inc();
}

/// Record a handled HTTP request
pub fn record_request(route: &str, status: u16) {
    HTTP_REQUESTS
        .with_label_values(&[route, &status.to_string()])
        .inc();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
