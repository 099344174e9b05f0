//! Expiry sweeper.
//!
//! Periodically flips the expired flag on every stored trade whose maturity
//! date has passed. Each tick is one read-modify-write batch under the store
//! lock; the wait between ticks happens with the lock released and is cut
//! short by the shutdown signal.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::clock::Clock;
use super::StoreLock;
use crate::storage::TradeRepository;
use crate::types::Expired;

/// Outcome of a single sweep tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Date the tick compared maturities against.
    pub as_of: NaiveDate,
    /// Trades flipped to expired by this tick.
    pub expired: usize,
}

pub struct ExpirySweeper {
    repo: Arc<dyn TradeRepository>,
    lock: StoreLock,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(repo: Arc<dyn TradeRepository>, lock: StoreLock, clock: Arc<dyn Clock>) -> Self {
        Self { repo, lock, clock }
    }

    /// Expire every matured trade still flagged `N`. Idempotent.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let _guard = self.lock.lock().await;

        let as_of = self.clock.today();
        let mut matured = self
            .repo
            .find_matured_not_expired(as_of)
            .await
            .context("Failed to query matured trades")?;

        if matured.is_empty() {
            debug!(%as_of, "Sweep found no matured trades");
            return Ok(SweepReport { as_of, expired: 0 });
        }

        for trade in &mut matured {
            trade.expired = Expired::Expired;
        }
        let saved = self
            .repo
            .save_all(matured)
            .await
            .context("Failed to save expired trades")?;

        info!(%as_of, expired = saved.len(), "Matured trades marked expired");
        Ok(SweepReport {
            as_of,
            expired: saved.len(),
        })
    }

    /// Sweep every `interval` until `shutdown` fires or its sender is dropped.
    ///
    /// The first sweep runs immediately. A failed tick is logged and the loop
    /// carries on; the next tick picks up whatever was missed.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Sweep tick failed, retrying next interval");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Expiry sweeper stopping");
                    break;
                }
            }
        }
    }

    /// Run the sweeper as a background task.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> SweeperHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(interval, rx).await });
        SweeperHandle { shutdown: tx, task }
    }
}

/// Handle to a running sweeper. Dropping it stops the sweeper after the
/// current tick, so keep it alive for as long as sweeping should continue.
#[must_use = "dropping the handle stops the sweeper"]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    /// A tick already in progress completes first.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.context("Expiry sweeper task failed")
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
