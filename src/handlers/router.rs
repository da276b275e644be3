//! Router Configuration - Centralized route definitions
//!
//! Routes are split into public (probes, metrics) and API routes. The caller
//! applies rate limiting to the API routes only.

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;
use super::{chat, health, queries};

/// Build the public routes (never rate limited)
///
/// These routes must always be accessible for:
/// - Health checks (Kubernetes probes)
/// - Metrics (Prometheus scraping)
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // HEALTH & KUBERNETES PROBES
        // =================================================================
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

/// Build the API routes
///
/// Identity is resolved per handler from the bearer header or the session
/// cookie; there is no separate auth layer.
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // CHAT
        // =================================================================
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/deepen", post(chat::deepen))
        .route("/api/chat/clear", post(chat::clear))
        // =================================================================
        // QUERY QUOTA
        // =================================================================
        .route("/api/queries/status", get(queries::status))
        .route("/api/queries/record", post(queries::record))
        .route("/api/queries/session-id", get(queries::session_id))
        .route("/api/queries/clear-cookies", post(queries::clear_cookies))
        .with_state(state)
}

/// Build the complete router with request metrics
///
/// Note: This function does NOT apply rate limiting, concurrency limits or
/// CORS. The caller (main.rs) should apply those layers as needed.
pub fn build_router(state: AppState) -> Router {
    let public = build_public_routes(state.clone());
    let api = build_api_routes(state);

    with_request_metrics(Router::new().merge(public).merge(api))
}

/// Record latency and status for every routed request
pub fn with_request_metrics(router: Router) -> Router {
    router.layer(axum::middleware::from_fn(crate::middleware::track_metrics))
}
