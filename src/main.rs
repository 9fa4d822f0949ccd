mod api;
mod config;
mod engine;
mod error;
mod models;
mod notify;
mod observability;
mod state;
mod stats;
mod storage;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::StorageBackend;
use crate::error::AppError;
use crate::storage::memory::MemoryStore;
use crate::storage::postgres::PgStore;
use crate::storage::OrderStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store: Arc<dyn OrderStore> = match config.backend {
        StorageBackend::Postgres => {
            let url = config.database_url.clone().ok_or_else(|| {
                AppError::Internal("DATABASE_URL is required for the postgres backend".to_string())
            })?;
            let store = PgStore::connect(&url, config.storage_timeout).await?;
            store.migrate().await?;
            tracing::info!("connected to postgres");
            Arc::new(store)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let app_state = Arc::new(state::AppState::new(store, &config));
    let app = api::rest::router(app_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
