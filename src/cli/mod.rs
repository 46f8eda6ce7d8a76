//! CLI module for the stream mocker server.
//!
//! This module provides the `stream-mocker serve` command implementation.

mod config;
mod handlers;
mod state;
mod store;

pub use config::{Config, ConfigError, GeneralConfig, ModelConfig, ResponseEntry, ServerConfig};
pub use handlers::{AppError, ConfigUpdateRequest};
pub use state::AppState;
pub use store::{ConfigStore, ModelUpdate};

use crate::stats::new_shared_stats;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route(
            "/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .route("/config/reload", post(handlers::reload_config))
        .route("/config/{model}", get(handlers::get_model_config))
        .route("/responses", get(handlers::list_responses))
        .route("/stats", get(handlers::get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the server until Ctrl+C or SIGTERM
pub async fn run_server(
    config: Config,
    config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.server.host.clone();
    let port = config.server.port;

    tracing::info!(
        default_rate = config.general.default_tokens_per_second,
        budget_secs = config.general.max_stream_time_seconds,
        enforce_time_limit = config.general.enforce_time_limit,
        models = config.models.len(),
        responses = config.responses.len(),
        "Configuration loaded"
    );

    let mut state = AppState::new(config, new_shared_stats());
    state.config_path = config_path;
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!("Starting stream mocker on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
