//! PriceSentry -- self-hosted scrape scheduler for retail price and stock
//! watching.
//!
//! This crate provides the scheduling core (due-task checks, priority queue,
//! bounded drain, execution history), the SQLite-backed task store, the HTTP
//! fetcher that talks to the extraction endpoint, and the management API.

pub mod api;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::EventBus;
use crate::fetcher::HttpFetcher;
use crate::scheduler::Scheduler;
use crate::storage::TaskStore;

/// Start the PriceSentry daemon: API server, wake producers, and the
/// scheduler loop. Runs until Ctrl-C, then shuts the loop down cleanly so the
/// last-check timestamp lands before exit.
pub async fn serve(config: &Config) -> Result<()> {
    tracing::info!(db_path = %config.db_path, "initializing task store");
    let pool = storage::open_pool(&config.db_path)?;
    let store = TaskStore::new(pool);

    let fetcher = HttpFetcher::new(
        config.extractor_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let scheduler = Scheduler::new(store.clone(), Arc::new(fetcher), EventBus::default());

    let shutdown = CancellationToken::new();
    let (wake_tx, wake_rx) = scheduler::wake_channel();
    scheduler::spawn_wake_sources(store, wake_tx.clone(), shutdown.clone());

    let loop_handle = tokio::spawn(scheduler::run_scheduler_loop(
        scheduler.clone(),
        wake_rx,
        shutdown.clone(),
    ));

    let addr: std::net::SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind))?;
    let app = api::router(api::state::AppState {
        scheduler,
        wake: wake_tx,
    });

    tracing::info!(%addr, extractor = %config.extractor_url, "pricesentry listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    // Server is down; stop the wake producers and let the scheduler loop
    // persist its last-check stamp on the way out.
    shutdown.cancel();
    let _ = loop_handle.await;

    Ok(())
}
