//! Health and Infrastructure Handlers
//!
//! Kubernetes probes and the Prometheus scrape endpoint.

use axum::{extract::State, http::StatusCode, response::Json};

use super::state::AppState;
use super::types::HealthResponse;
use crate::metrics;

/// Main health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = state.orchestrator();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
        ledger_records: orchestrator.ledger().total_records(),
        live_buffers: orchestrator.memory().live_buffers(),
        memory_scope: orchestrator.memory().scope().to_string(),
        provider: orchestrator.provider_name().to_string(),
    })
}

/// Liveness probe - indicates if process is alive and not deadlocked
pub async fn health_live() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Readiness probe - indicates if service can handle traffic
pub async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let provider_configured = state.config().provider.api_key.is_some();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "version": env!("CARGO_PKG_VERSION"),
            "ledger_records": state.orchestrator().ledger().total_records(),
            "provider_configured": provider_configured,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Prometheus metrics endpoint for observability
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    use prometheus::Encoder;

    metrics::LIVE_BUFFERS.set(state.orchestrator().memory().live_buffers() as i64);

    let encoder = prometheus::TextEncoder::new();
    let metric_families = metrics::METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::handlers::test_helpers::{get, send, TestHarness};

    #[tokio::test]
    async fn test_health_reports_components() {
        let h = TestHarness::new();
        let (status, body) = send(h.router(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["ledger_records"], 0);
        assert_eq!(body["memory_scope"], "per_identity");
        assert_eq!(body["provider"], "scripted");
    }

    #[tokio::test]
    async fn test_probes() {
        let h = TestHarness::new();
        let (live, _) = send(h.router(), get("/health/live")).await;
        let (ready, body) = send(h.router(), get("/health/ready")).await;
        assert_eq!(live, StatusCode::OK);
        assert_eq!(ready, StatusCode::OK);
        assert_eq!(body["provider_configured"], false);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        let h = TestHarness::new();
        let (status, _) = send(h.router(), get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
