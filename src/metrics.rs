//! Prometheus metrics
//!
//! Request rates, quota decisions, provider health and leakage signals.
//! Labels never carry user ids or session tokens.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "guard_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("guard_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Quota Metrics
    // ============================================================================

    /// Admission decisions by identity kind (registered/anonymous)
    pub static ref QUOTA_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("guard_quota_decisions_total", "Quota admission decisions"),
        &["identity", "outcome"]
    ).unwrap();

    /// Records appended to the ledger
    pub static ref LEDGER_RECORDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("guard_ledger_records_total", "Query records appended"),
        &["identity", "kind"]
    ).unwrap();

    // ============================================================================
    // Provider Metrics
    // ============================================================================

    pub static ref PROVIDER_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("guard_provider_calls_total", "Provider calls by purpose and outcome"),
        &["purpose", "outcome"]
    ).unwrap();

    pub static ref PROVIDER_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "guard_provider_latency_seconds",
            "Provider call latency"
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0])
    ).unwrap();

    // ============================================================================
    // Guard / Memory Metrics
    // ============================================================================

    /// Leakage detections by stage ("reply" or "context")
    pub static ref LEAKAGE_DETECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("guard_leakage_detections_total", "Out-of-persona detections"),
        &["stage"]
    ).unwrap();

    /// Conversation buffers held in process
    pub static ref LIVE_BUFFERS: IntGauge = IntGauge::new(
        "guard_live_conversation_buffers",
        "Conversation buffers held in process"
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(QUOTA_DECISIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(LEDGER_RECORDS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(PROVIDER_CALLS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(PROVIDER_LATENCY.clone()))?;

    METRICS_REGISTRY.register(Box::new(LEAKAGE_DETECTIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(LIVE_BUFFERS.clone()))?;

    Ok(())
}

/// Records elapsed time into a histogram on drop
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
