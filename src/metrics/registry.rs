// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, HistogramVec, GaugeVec, Opts, Registry, TextEncoder, Encoder,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_gauge_vec_with_registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REQUEST METRICS
    // ============================================================================

    /// Total number of HTTP requests served
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status_code"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache outcomes, one label value per log outcome tag
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total cache operations by outcome"),
        &["outcome"], // outcome: hit, miss, coalesced, miss_no_redis, force_refresh, ...
        REGISTRY
    ).unwrap();

    /// Fetches and background refreshes currently in flight
    pub static ref CACHE_INFLIGHT: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("cache_inflight", "Producer runs currently in flight"),
        &["kind"], // kind: fetch, refresh
        REGISTRY
    ).unwrap();

    // ============================================================================
    // PREWARM METRICS
    // ============================================================================

    /// Prewarm cycles by result
    pub static ref PREWARM_CYCLES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("prewarm_cycles_total", "Total prewarm cycles"),
        &["status"], // status: completed, partial, skipped
        REGISTRY
    ).unwrap();

    /// Prewarm cycle duration
    pub static ref PREWARM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("prewarm_cycle_duration_seconds", "Prewarm cycle duration")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["status"],
        REGISTRY
    ).unwrap();

    /// Failed warmer invocations
    pub static ref PREWARM_FAILURES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("prewarm_tenant_failures_total", "Total failed tenant warmups"),
        &["warmer"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // UPSTREAM METRICS
    // ============================================================================

    /// Calls to the marketplace API
    pub static ref UPSTREAM_REQUESTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_requests_total", "Total marketplace API calls"),
        &["endpoint", "status_code"],
        REGISTRY
    ).unwrap();

    /// Marketplace API call duration
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("upstream_duration_seconds", "Marketplace API call duration")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["endpoint"],
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
