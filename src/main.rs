//! yupp-bridge - HTTP Server Entry Point
//!
//! Starts the OpenAI-compatible gateway.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yupp_bridge::{api, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yupp_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        accounts_file = %config.accounts_file.display(),
        client_keys_file = %config.client_keys_file.display(),
        models_file = %config.models_file.display(),
        debug_mode = config.debug_mode,
        "Loaded configuration"
    );

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting server on {}", addr);

    api::serve(config).await?;

    Ok(())
}
