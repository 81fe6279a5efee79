//! relay-control-plane server entry point.
//!
//! Boots the stores, module registry and pipeline reconciler, then serves
//! the admin API and the live pipelines from one Axum server.

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relay_control_plane::api;
use relay_control_plane::app_state::AppState;
use relay_control_plane::config::{ControlPlaneConfig, LogFormat};
use relay_control_plane::modules::builtin;
use relay_control_plane::persistence::{DocumentBackend, MemoryBackend, PostgresBackend};
use relay_control_plane::service::ControlPlane;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ControlPlaneConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting relay-control-plane");

    // Build persistence layer
    let backend: Arc<dyn DocumentBackend> = if config.persistence_enabled {
        let postgres = PostgresBackend::connect(&config)
            .await
            .context("failed to connect to PostgreSQL")?;
        Arc::new(postgres)
    } else {
        tracing::warn!("persistence disabled, documents are kept in memory");
        Arc::new(MemoryBackend::new())
    };

    // Build stores, registry and pipelines
    let control_plane = Arc::new(
        ControlPlane::bootstrap(backend, &builtin::units())
            .await
            .context("failed to start pipelines")?,
    );

    // Build application state
    let app_state = AppState::new(Arc::clone(&control_plane), config.public_base_url.clone());

    // Build router
    let app = api::build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    control_plane.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
