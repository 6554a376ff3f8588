use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use property_lister::api::{create_router, AppState};
use property_lister::auth::ApiKeyAuthenticator;
use property_lister::config::{ConfigManager, LogFormat, LoggingConfig};
use property_lister::db::SqliteExecutor;
use property_lister::properties::PropertyLister;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = ConfigManager::new()?
        .load()
        .await
        .context("Failed to load configuration")?;

    init_logging(&config.logging);

    // The pool is owned here, not by the request path.
    let executor = Arc::new(SqliteExecutor::connect(&config.database).await?);
    let authenticator = Arc::new(ApiKeyAuthenticator::from_config(&config.auth));
    let lister = PropertyLister::new(executor.clone());

    let app = create_router(
        AppState::new(lister, authenticator),
        &config.server.cors_allowed_origins,
    );

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(
        environment = %config.server.environment,
        "Property lister listening on {}",
        address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    executor.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

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

    tracing::info!("Shutdown signal received, draining connections");
}
