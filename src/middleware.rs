//! HTTP request tracking middleware

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::{Duration, Instant};

/// Track HTTP request latency and counts
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = metric_endpoint(req.extensions().get::<MatchedPath>().map(|p| p.as_str()))
        .to_string();

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &endpoint, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, &status])
        .inc();

    response
}

/// Abort a request that runs past `limit`
///
/// The inner future is dropped on expiry, so an uncommitted quota permit is
/// released without charging.
pub async fn enforce_deadline(State(limit): State<Duration>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, limit_secs = limit.as_secs(), "Request deadline exceeded");
            (StatusCode::GATEWAY_TIMEOUT, "Request timed out").into_response()
        }
    }
}

/// Route template for the label; unrouted paths collapse into one bucket
///
/// Raw request paths are attacker-chosen and would explode label cardinality.
fn metric_endpoint(matched: Option<&str>) -> &str {
    matched.unwrap_or("unmatched")
}
