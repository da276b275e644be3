//! Shared test utilities for handler unit tests.
//!
//! Provides a [`TestHarness`] that builds a [`GuardState`] over a fresh RocksDB
//! ledger in a temp directory and a scripted provider, plus convenience helpers
//! for building HTTP requests and reading JSON response bodies.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot()

use super::router::build_router;
use super::state::{AppState, GuardState};
use crate::config::ServerConfig;
use crate::provider::ScriptedProvider;
use crate::quota::WriteMode;

/// Bearer credential registered for [`TEST_USER_ID`] in every harness.
pub const TEST_USER_TOKEN: &str = "test-user-token-2025";
pub const TEST_USER_ID: &str = "alice";

/// A self-contained test environment with its own temp storage.
///
/// Holds `TempDir` so the directory isn't cleaned up until the harness drops.
pub struct TestHarness {
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
    _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with a fresh temp directory and default config.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a harness from `config`; storage path and credentials are overridden.
    pub fn with_config(mut config: ServerConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        config.storage_path = temp_dir.path().to_path_buf();
        config.identity.user_tokens =
            vec![(TEST_USER_TOKEN.to_string(), TEST_USER_ID.to_string())];

        let provider = Arc::new(ScriptedProvider::new());
        let state = GuardState::with_provider(config, provider.clone(), WriteMode::Async)
            .expect("failed to create test GuardState");

        Self {
            state: Arc::new(state),
            provider,
            _temp_dir: temp_dir,
        }
    }

    /// Build the full application router (public + API routes).
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Request builders ----------

/// Build a GET request to `uri`.
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a POST request to `uri` with a JSON body.
pub fn post_json<T: serde::Serialize>(uri: &str, body: &T) -> Request<Body> {
    let json = serde_json::to_string(body).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json))
        .unwrap()
}

/// Add an `Authorization: Bearer` header.
pub fn with_bearer(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

// ---------- Response helpers ----------

/// Send a request through the router and return the raw response.
pub async fn send_raw(app: Router, req: Request<Body>) -> Response<Body> {
    app.oneshot(req).await.unwrap()
}

/// Send a request through the router and return (status, JSON body).
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body_bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&body_bytes).to_string())
        })
    };
    (status, json)
}

/// `Set-Cookie` values of a response
pub fn set_cookies(resp: &Response<Body>) -> Vec<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}
