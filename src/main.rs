//! Trade Store entry point.
//!
//! Loads configuration, initialises structured logging, opens the SQLite
//! store, starts the expiry sweeper and serves the HTTP API until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use tradestore::api::{self, ApiState};
use tradestore::config::AppConfig;
use tradestore::engine::TradeStore;
use tradestore::storage::SqliteTradeRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::default_path();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        database_url = %cfg.store.database_url,
        strategy = %cfg.ingestion.strategy,
        sweep_interval_ms = cfg.sweeper.interval_millis,
        "Trade store starting up"
    );

    let repo = SqliteTradeRepository::connect(&cfg.store.database_url).await?;
    let store = TradeStore::new(Arc::new(repo));

    let sweeper = store.start_sweeper(cfg.sweeper.interval_millis);

    if cfg.api.enabled {
        let state = Arc::new(ApiState::new(store, cfg.ingestion.strategy));
        api::serve(state, cfg.api.port, shutdown_signal()).await?;
    } else {
        warn!("API disabled, running expiry sweeps only. Press Ctrl+C to stop.");
        shutdown_signal().await;
    }

    sweeper.shutdown().await?;
    info!("Trade store shut down cleanly.");

    Ok(())
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tradestore=info"));

    let json_logging = std::env::var("TRADESTORE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
