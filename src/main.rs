// src/main.rs
/**
* author : HAMA
* date: 2025. 5. 14.
* description: Entry point for the CoinJoin detection and tracing service.
*/

use cjScanner::config::Settings;
use cjScanner::engine::Engine;
use cjScanner::shutdown::shutdown_signal;
use cjScanner::types::AppError;

use log::{info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Application starting...");

    // 2. Load configuration
    let settings = Settings::new().map_err(|e| AppError::Config(e.to_string()))?;
    info!("Configuration loaded.");

    // 3. Wire up the engine (store connection failures are fatal here)
    let engine = Arc::new(Engine::from_settings(&settings).await?);
    let health = engine.health().await;
    info!(
        "Graph store connected: {} transactions, {} addresses",
        health.store.transactions, health.store.addresses
    );
    if engine.ml_available() {
        info!("ML detector enabled.");
    } else {
        warn!("ML detector disabled, running heuristic only.");
    }
    info!(
        "REST surface expected at {}:{} (external collaborator).",
        settings.server.host, settings.server.port
    );

    // 4. Start mempool monitoring
    engine.monitor().start().await?;

    // 5. Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received. Waiting for tasks to finish...");

    // 6. Gracefully stop the monitor; workers drain
    engine.monitor().stop().await;

    let status = engine.monitor().status();
    info!(
        "Monitor totals: processed {}, positive {}, dropped {}",
        status.processed, status.positive, status.dropped
    );

    info!("Application exited cleanly.");
    Ok(())
}
