//! Persona-Guard - quota, memory and leakage guard for a persona chat backend
//!
//! Standalone HTTP server in front of an OpenAI-compatible model endpoint.

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;

use persona_guard::config::{print_env_help, ServerConfig};
use persona_guard::handlers::{
    build_api_routes, build_public_routes, with_request_metrics, GuardState,
};
use persona_guard::middleware::enforce_deadline;
use persona_guard::{metrics, tracing_setup};

// Shutdown timeouts
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30; // Max time for cleanup after draining
const DATABASE_FLUSH_TIMEOUT_SECS: u64 = 10; // Max time to flush RocksDB

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|a| a == "--help" || a == "-h") {
        print_env_help();
        return Ok(());
    }

    // Load configuration from environment
    let server_config = ServerConfig::from_env()?;

    if let Err(e) = tracing_setup::init_tracing(server_config.log_json) {
        eprintln!("Failed to initialize logging: {e}");
    }

    metrics::register_metrics().context("Failed to register metrics")?;
    info!("Metrics registered at /metrics");

    info!("Starting persona-guard server...");
    server_config.log();

    let state = Arc::new(GuardState::new(server_config.clone())?);

    // Keep a reference for shutdown cleanup (clone BEFORE moving into router)
    let state_for_shutdown = Arc::clone(&state);

    // API routes - rate limited per client IP
    let api_routes = build_api_routes(state.clone());
    let api_routes = if server_config.rate_limit_per_second > 0 {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(server_config.rate_limit_per_second)
            .burst_size(server_config.rate_limit_burst)
            .finish()
            .context("Failed to build governor rate limiter configuration")?;

        info!(
            "Rate limiting enabled: {} req/sec, burst of {}",
            server_config.rate_limit_per_second, server_config.rate_limit_burst
        );
        api_routes.layer(GovernorLayer::new(governor_conf))
    } else {
        info!("Rate limiting disabled");
        api_routes
    };

    // Public routes - NO rate limiting (health checks, metrics)
    // These must always be accessible for monitoring and Kubernetes probes
    let public_routes = build_public_routes(state);

    let max_concurrent = server_config.max_concurrent_requests;
    info!(
        "Concurrency limiting enabled: max_concurrent={}",
        max_concurrent
    );

    let cors = server_config.cors.to_layer();

    let app = with_request_metrics(Router::new().merge(public_routes).merge(api_routes))
        .layer(axum::middleware::from_fn_with_state(
            server_config.request_timeout(),
            enforce_deadline,
        ))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                server_config.host, server_config.port
            )
        })?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run the server - it will wait until shutdown signal is received
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, flushing query ledger...");

    let cleanup_future = async {
        let flush_future = async { state_for_shutdown.flush() };

        match tokio::time::timeout(
            std::time::Duration::from_secs(DATABASE_FLUSH_TIMEOUT_SECS),
            flush_future,
        )
        .await
        {
            Ok(Ok(())) => info!("Query ledger flushed"),
            Ok(Err(e)) => tracing::error!("Failed to flush query ledger: {:#}", e),
            Err(_) => tracing::error!(
                "Ledger flush timed out after {}s",
                DATABASE_FLUSH_TIMEOUT_SECS
            ),
        }
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        cleanup_future,
    )
    .await
    {
        Ok(()) => {
            info!("Server shutdown complete");
        }
        Err(_) => {
            tracing::error!(
                "Graceful shutdown timed out after {}s, forcing exit",
                GRACEFUL_SHUTDOWN_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
