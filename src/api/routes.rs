//! Server assembly: shared state, router and the listen loop.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::account_pool::AccountPool;
use crate::config::{load_account_tokens, load_client_keys, load_models, Config};
use crate::gateway::Gateway;
use crate::models::ModelRegistry;
use crate::upstream::{SharedUpstream, YuppClient};

use super::auth::ClientKeySet;
use super::chat;

/// Shared application state.
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Accepted client API keys
    pub client_keys: ClientKeySet,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, client_keys: ClientKeySet) -> Self {
        Self {
            gateway,
            client_keys,
        }
    }
}

/// All routes with the CORS and access-log layers applied.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(chat::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    if config.bootstrap_files {
        let created = config.bootstrap_missing_files()?;
        if !created.is_empty() {
            tracing::info!("Created {} placeholder data files", created.len());
        }
    }

    let tokens = load_account_tokens(&config.accounts_file);
    let client_keys = ClientKeySet::new(load_client_keys(&config.client_keys_file));
    let models = ModelRegistry::new(load_models(&config.models_file));

    if tokens.is_empty() {
        tracing::warn!("No upstream accounts configured, chat requests will fail with 503");
    }
    if client_keys.is_empty() {
        tracing::warn!("No client API keys configured, all authenticated requests will fail with 503");
    }
    if models.is_empty() {
        tracing::warn!("Model registry is empty");
    } else {
        tracing::info!(sample = ?models.sample_labels(5), "Available models");
    }

    let pool = Arc::new(AccountPool::from_tokens(tokens, config.pool.clone()));
    let upstream: SharedUpstream = Arc::new(YuppClient::new(&config.upstream)?);
    let gateway = Arc::new(Gateway::new(
        pool,
        Arc::new(models),
        upstream,
        config.debug_mode,
    ));
    let state = Arc::new(AppState::new(gateway, client_keys));

    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Setup graceful shutdown on SIGTERM/SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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

    tracing::info!("Shutdown signal received, finishing in-flight requests");
}
