// SPDX-License-Identifier: GPL-3.0-only
mod api;
mod cache;
mod catalog;
mod config;
mod error;
mod logging;
mod store;
mod sync;
mod utils;
mod view;
mod watcher;

#[cfg(test)]
mod test_helpers;

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use api::HttpServer;
use cache::{ProductCache, SqliteKvStore};
use config::Config;
use logging::setup_logging;
use store::{build_local_fallback, build_store};
use sync::{SyncCoordinator, SyncScheduler};
use watcher::build_watcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    setup_logging(&config.log_level)?;

    info!("Starting StockMaster v{}", env!("CARGO_PKG_VERSION"));
    config.validate().context("Invalid configuration")?;

    let categories = config.category_registry();

    let kv = SqliteKvStore::new(&config.cache_db_path)
        .await
        .with_context(|| format!("Failed to open cache at {}", config.cache_db_path.display()))?;
    info!(path = %config.cache_db_path.display(), "Cache initialized");
    let cache = ProductCache::new(Arc::new(kv));

    let remote = build_store(&config, &categories)?;
    let fallback = build_local_fallback(&config, &categories);
    info!(backend = %config.backend, fallback = fallback.is_some(), "Product store configured");

    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::clone(&remote),
        fallback,
        cache,
        config.cache_max_age(),
    ));
    let state = coordinator.start().await;
    info!(state = %state, "Initial load finished");

    let scheduler = SyncScheduler::new(Arc::clone(&coordinator), config.sync_interval()).start();

    let mut watcher = build_watcher(&config, &remote);
    let watcher_task = match watcher.as_mut() {
        Some(w) => match w.watch().await {
            Ok(mut events) => {
                let coordinator = Arc::clone(&coordinator);
                Some(tokio::spawn(async move {
                    info!("Watcher task started");
                    while let Some(event) = events.recv().await {
                        coordinator.handle_watch_event(event).await;
                    }
                }))
            }
            Err(e) => {
                warn!(error = %e, "Change watcher unavailable, relying on periodic sync");
                None
            }
        },
        None => None,
    };

    let http_server = HttpServer::new(Arc::clone(&coordinator), categories, config.local_api_bind);
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve().await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("All services started. Waiting for shutdown signal...");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
        Err(err) => error!(error = %err, "Unable to listen for shutdown signal"),
    }

    info!("Initiating graceful shutdown...");

    scheduler.stop().await;
    if let Some(w) = watcher.as_mut() {
        if let Err(e) = w.stop().await {
            warn!(error = %e, "Failed to stop change watcher");
        }
    }
    if let Some(task) = watcher_task {
        task.abort();
    }
    http_task.abort();

    let pending = coordinator.pending().await.len();
    if pending > 0 {
        warn!(pending, "Shutting down with unsynchronized changes; they stay queued in the cache");
    }

    info!("Shutdown complete");
    Ok(())
}
