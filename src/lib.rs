//! Persona-Guard Library
//!
//! Guard subsystem for a persona chat backend.
//!
//! # Key Features
//! - Quota ledger: lifetime allowance for anonymous sessions, daily allowance
//!   for registered users, persisted in RocksDB
//! - Bounded conversational memory used as model context
//! - Leakage guard that purges memory and retries once when a reply drifts out
//!   of persona
//! - axum HTTP surface with cookie-carried anonymous sessions

pub mod auth;
pub mod chat;
pub mod config;
pub mod constants;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod identity;
pub mod memory;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod quota;
pub mod tracing_setup;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use uuid;
