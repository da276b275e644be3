//! HTTP API Handlers
//!
//! Thin axum boundary over the chat orchestrator: identity resolution, cookie
//! handling, validation and JSON envelopes.

// Core modules
pub mod router;
pub mod session;
pub mod state;
pub mod types;

// Health and metrics
pub mod health;

// API
pub mod chat;
pub mod queries;

// Test utilities (compiled only in test builds)
#[cfg(test)]
pub mod test_helpers;

pub use router::{build_api_routes, build_public_routes, build_router, with_request_metrics};
pub use state::{AppState, GuardState};
