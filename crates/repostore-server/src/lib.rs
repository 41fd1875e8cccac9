//! # Repostore Server
//!
//! The HTTP API surface of the repository store: request dispatch against
//! the operation route table, cache directives tied to commit-id
//! canonicality, the git smart-transport proxy, configuration, and
//! observability.

#![forbid(unsafe_code)]

mod cache;
mod config;
mod dispatch;
mod error;
mod handlers;
mod metrics;
mod middleware;
pub mod observability;
mod transport;

pub use config::ServerConfig;
pub use dispatch::{create_router, AppState};
pub use metrics::Metrics;

use repostore_vcs::{DriverRegistry, RepoManager};
use std::sync::Arc;

/// Builds the application state for a config, with the default driver
/// registry.
pub fn build_state(config: ServerConfig) -> AppState {
    let registry = Arc::new(DriverRegistry::with_defaults());
    let manager = Arc::new(RepoManager::new(config.storage_dir.clone(), registry));
    AppState::new(manager, config)
}

/// Runs the HTTP server until shutdown.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    if config.tls_cert.is_some() || config.tls_key.is_some() {
        anyhow::bail!(
            "TLS termination is delegated to a fronting proxy; unset tls_cert/tls_key"
        );
    }
    if !config.cache.is_disabled() {
        tracing::warn!(
            cache = %config.cache,
            "HTTP response caching is delegated to a fronting cache; option is recorded only"
        );
    }

    std::fs::create_dir_all(&config.storage_dir)?;

    let bind_addr = config.bind_addr;
    let state = build_state(config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install CTRL+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
