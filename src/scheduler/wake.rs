//! Wake-up sources -- redundant triggers funneling into one channel.
//!
//! No single timer survives every suspend/throttle scenario, so several
//! independent producers push onto one channel and a single consumer loop
//! runs the due-task check. Every trigger is idempotent by construction:
//! the queue deduplicates and the drain flag prevents overlap.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::storage::TaskStore;

use super::engine::Scheduler;
use super::{CHECK_INTERVAL, HEARTBEAT_INTERVAL};

/// Why the scheduler is being woken. Carried for logging only; every reason
/// leads to the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Primary ticker.
    Interval,
    /// Coarse fallback ticker.
    Heartbeat,
    /// Wall clock jumped ahead of monotonic time (host slept or froze).
    ClockJump,
    /// Persisted last-check was stale or absent at startup.
    Startup,
    /// Run-now request from the API.
    Manual,
}

pub fn wake_channel() -> (
    mpsc::UnboundedSender<WakeReason>,
    mpsc::UnboundedReceiver<WakeReason>,
) {
    mpsc::unbounded_channel()
}

/// Spawn every background wake producer.
pub fn spawn_wake_sources(
    store: TaskStore,
    tx: mpsc::UnboundedSender<WakeReason>,
    shutdown: CancellationToken,
) {
    // The primary ticker fires immediately, matching the check-on-start
    // behavior the heartbeat and recovery sources then back up.
    tokio::spawn(ticker_source(
        WakeReason::Interval,
        CHECK_INTERVAL,
        true,
        tx.clone(),
        shutdown.clone(),
    ));
    tokio::spawn(ticker_source(
        WakeReason::Heartbeat,
        HEARTBEAT_INTERVAL,
        false,
        tx.clone(),
        shutdown.clone(),
    ));
    tokio::spawn(clock_jump_source(tx.clone(), shutdown));
    tokio::spawn(startup_recovery(store, tx));
}

/// Consume wakes until shutdown, running the due-task check for each one.
/// Check failures are logged and the loop keeps going; the store is treated
/// as always-available.
pub async fn run_scheduler_loop(
    scheduler: Scheduler,
    mut wake_rx: mpsc::UnboundedReceiver<WakeReason>,
    shutdown: CancellationToken,
) {
    info!("scrape scheduler started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            wake = wake_rx.recv() => {
                let Some(reason) = wake else { break };
                debug!(?reason, "wake");
                match scheduler.check_due().await {
                    Ok(0) => {}
                    Ok(queued) => info!(queued, ?reason, "due tasks queued"),
                    Err(e) => error!("due-task check failed: {e:#}"),
                }
            }
        }
    }

    if let Err(e) = scheduler.touch_last_check().await {
        warn!("could not persist last check at shutdown: {e:#}");
    }
    info!("scrape scheduler stopped");
}

async fn ticker_source(
    reason: WakeReason,
    period: Duration,
    fire_immediately: bool,
    tx: mpsc::UnboundedSender<WakeReason>,
    shutdown: CancellationToken,
) {
    let start = if fire_immediately {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if tx.send(reason).is_err() {
                    break;
                }
            }
        }
    }
}

/// Detect suspends by comparing wall-clock progress against the monotonic
/// ticker. Tokio timers stop during a host sleep; the wall clock does not,
/// so a large gap between polls means due times may have sailed past.
async fn clock_jump_source(tx: mpsc::UnboundedSender<WakeReason>, shutdown: CancellationToken) {
    let threshold_secs = 2 * CHECK_INTERVAL.as_secs() as i64;
    let mut ticker = interval_at(Instant::now() + CHECK_INTERVAL, CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut wall = Utc::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now = Utc::now();
                let elapsed = now.signed_duration_since(wall).num_seconds();
                wall = now;
                if elapsed >= threshold_secs {
                    info!(gap_secs = elapsed, "wall clock jumped ahead, checking immediately");
                    if tx.send(WakeReason::ClockJump).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// One-shot at startup: if the persisted last-check is older than the check
/// interval (or missing entirely), tasks may have come due while the process
/// was down.
async fn startup_recovery(store: TaskStore, tx: mpsc::UnboundedSender<WakeReason>) {
    let stale = match store.last_check().await {
        Ok(Some(last)) => {
            let gap = Utc::now().signed_duration_since(last).num_seconds();
            if gap >= CHECK_INTERVAL.as_secs() as i64 {
                info!(gap_secs = gap, "last check is stale, checking immediately");
                true
            } else {
                debug!(gap_secs = gap, "last check is recent, no recovery needed");
                false
            }
        }
        Ok(None) => {
            info!("no recorded last check, checking immediately");
            true
        }
        Err(e) => {
            warn!("could not read last-check timestamp: {e:#}");
            false
        }
    };

    if stale {
        let _ = tx.send(WakeReason::Startup);
    }
}
