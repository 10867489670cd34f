// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    REQUESTS_TOTAL,
    CACHE_OPERATIONS,
    CACHE_INFLIGHT,
    PREWARM_CYCLES,
    PREWARM_DURATION,
    PREWARM_FAILURES,
    UPSTREAM_REQUESTS,
    UPSTREAM_DURATION,
};

/// Helper to record HTTP request metrics
pub fn record_request(method: &str, endpoint: &str, status_code: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status_code.to_string()])
        .inc();
}

/// Helper to record a cache outcome (`hit`, `miss`, `write_error`, ...)
pub fn record_cache_outcome(outcome: &str) {
    CACHE_OPERATIONS.with_label_values(&[outcome]).inc();
}

pub fn inflight_started(kind: &str) {
    CACHE_INFLIGHT.with_label_values(&[kind]).inc();
}

pub fn inflight_finished(kind: &str) {
    CACHE_INFLIGHT.with_label_values(&[kind]).dec();
}

/// Helper to record a finished prewarm cycle
pub fn record_prewarm_cycle(status: &str, duration_secs: f64) {
    PREWARM_CYCLES.with_label_values(&[status]).inc();
    PREWARM_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

pub fn record_prewarm_failure(warmer: &str) {
    PREWARM_FAILURES.with_label_values(&[warmer]).inc();
}

/// Helper to record marketplace API call metrics
pub fn record_upstream_call(endpoint: &str, status_code: u16, duration_secs: f64) {
    UPSTREAM_REQUESTS
        .with_label_values(&[endpoint, &status_code.to_string()])
        .inc();
    UPSTREAM_DURATION
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}
