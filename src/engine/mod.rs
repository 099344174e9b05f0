//! Core engine: versioned ingestion plus the background expiry sweep.
//!
//! `TradeStore` wires an ingestor and a sweeper over one repository and one
//! store-wide lock, and is the call surface used by the HTTP layer and `main`.

pub mod clock;
pub mod ingestion;
pub mod sweeper;

use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::storage::TradeRepository;
use crate::types::{Trade, TradeStoreError, TradeUpdateRequest};
use clock::{Clock, SystemClock};
use ingestion::TradeIngestor;
use sweeper::{ExpirySweeper, SweepReport, SweeperHandle};

/// Store-wide mutual exclusion for read-decide-write sequences.
/// At most one submit or sweep tick holds it at a time.
pub type StoreLock = Arc<Mutex<()>>;

/// How ingestion looks up existing versions of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    /// One read of every version, decided in the application.
    #[default]
    Bulk,
    /// Newer-version and exact-version queries answered by the repository.
    Targeted,
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalStrategy::Bulk => write!(f, "bulk"),
            RetrievalStrategy::Targeted => write!(f, "targeted"),
        }
    }
}

pub struct TradeStore {
    repo: Arc<dyn TradeRepository>,
    ingestor: TradeIngestor,
    sweeper: Arc<ExpirySweeper>,
}

impl TradeStore {
    /// A store using the host's local date.
    pub fn new(repo: Arc<dyn TradeRepository>) -> Self {
        Self::with_clock(repo, Arc::new(SystemClock))
    }

    pub fn with_clock(repo: Arc<dyn TradeRepository>, clock: Arc<dyn Clock>) -> Self {
        let lock: StoreLock = Arc::new(Mutex::new(()));
        Self {
            ingestor: TradeIngestor::new(repo.clone(), lock.clone(), clock.clone()),
            sweeper: Arc::new(ExpirySweeper::new(repo.clone(), lock, clock)),
            repo,
        }
    }

    /// Ingest with the bulk strategy.
    pub async fn submit(&self, request: TradeUpdateRequest) -> Result<Trade, TradeStoreError> {
        self.ingestor.submit(request).await
    }

    /// Ingest with the targeted strategy. Same contract as `submit`.
    pub async fn submit_low_memory(
        &self,
        request: TradeUpdateRequest,
    ) -> Result<Trade, TradeStoreError> {
        self.ingestor.submit_low_memory(request).await
    }

    pub async fn submit_with(
        &self,
        strategy: RetrievalStrategy,
        request: TradeUpdateRequest,
    ) -> Result<Trade, TradeStoreError> {
        match strategy {
            RetrievalStrategy::Bulk => self.submit(request).await,
            RetrievalStrategy::Targeted => self.submit_low_memory(request).await,
        }
    }

    /// Run one expiry sweep now.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        self.sweeper.sweep_once().await
    }

    /// Start the recurring expiry sweep. Runs until the handle is shut down.
    pub fn start_sweeper(&self, interval_millis: u64) -> SweeperHandle {
        self.sweeper
            .clone()
            .spawn(Duration::from_millis(interval_millis.max(1)))
    }

    /// Every stored version of a trade id, oldest first. Reads skip the lock.
    pub async fn versions_of(&self, trade_id: &str) -> Result<Vec<Trade>> {
        let mut trades = self.repo.find_by_trade_id(trade_id).await?;
        trades.sort_by_key(|t| t.version);
        Ok(trades)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
