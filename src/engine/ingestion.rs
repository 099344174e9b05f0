//! Trade ingestion.
//!
//! Validates an incoming `TradeUpdateRequest` and applies it to the store:
//! a past maturity date or an older version than one already stored is
//! rejected, a repeated `(trade_id, version)` overwrites the stored trade in
//! place, anything else is inserted as a new trade.
//!
//! Two retrieval strategies implement the same contract:
//! - `submit` reads every version of the trade id once and decides in memory
//! - `submit_low_memory` asks the repository for newer versions and for the
//!   exact version separately, keeping the working set small
//!
//! Candidate reads and the final write happen under the store lock.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::StoreLock;
use crate::storage::TradeRepository;
use crate::types::{Expired, Trade, TradeStoreError, TradeUpdateRequest};

pub struct TradeIngestor {
    repo: Arc<dyn TradeRepository>,
    lock: StoreLock,
    clock: Arc<dyn Clock>,
}

impl TradeIngestor {
    pub fn new(repo: Arc<dyn TradeRepository>, lock: StoreLock, clock: Arc<dyn Clock>) -> Self {
        Self { repo, lock, clock }
    }

    /// Ingest using a single bulk read of every version of the trade id.
    pub async fn submit(&self, request: TradeUpdateRequest) -> Result<Trade, TradeStoreError> {
        self.check_maturity(&request)?;

        let _guard = self.lock.lock().await;

        let stored = self.repo.find_by_trade_id(&request.trade_id).await?;
        let latest = stored.iter().map(|t| t.version).max();
        if let Some(latest) = latest.filter(|v| *v > request.version) {
            return Err(self.reject_stale(&request, latest));
        }

        let existing = stored.into_iter().find(|t| t.version == request.version);
        self.persist(request, existing).await
    }

    /// Ingest using targeted queries evaluated by the repository.
    pub async fn submit_low_memory(
        &self,
        request: TradeUpdateRequest,
    ) -> Result<Trade, TradeStoreError> {
        self.check_maturity(&request)?;

        let _guard = self.lock.lock().await;

        let newer = self
            .repo
            .find_by_trade_id_and_version_greater_than(&request.trade_id, request.version)
            .await?;
        if let Some(latest) = newer.iter().map(|t| t.version).max() {
            return Err(self.reject_stale(&request, latest));
        }

        let existing = self
            .repo
            .find_exact_version(&request.trade_id, request.version)
            .await?;
        self.persist(request, existing).await
    }

    /// Reject maturity dates before today. Touches nothing but the clock.
    fn check_maturity(&self, request: &TradeUpdateRequest) -> Result<(), TradeStoreError> {
        let today = self.clock.today();
        if request.maturity_date < today {
            warn!(
                trade_id = %request.trade_id,
                version = request.version,
                maturity_date = %request.maturity_date,
                %today,
                "Rejected trade: maturity date in the past"
            );
            return Err(TradeStoreError::InvalidMaturityDate {
                maturity_date: request.maturity_date,
                today,
            });
        }
        Ok(())
    }

    fn reject_stale(&self, request: &TradeUpdateRequest, latest: u32) -> TradeStoreError {
        warn!(
            trade_id = %request.trade_id,
            version = request.version,
            latest,
            "Rejected trade: newer version already stored"
        );
        TradeStoreError::StaleVersion {
            trade_id: request.trade_id.clone(),
            requested: request.version,
            latest,
        }
    }

    /// Build the final trade from the request and write it.
    /// Caller must hold the store lock.
    async fn persist(
        &self,
        request: TradeUpdateRequest,
        existing: Option<Trade>,
    ) -> Result<Trade, TradeStoreError> {
        let overwrite = existing.is_some();
        let mut trade = match existing {
            Some(mut trade) => {
                trade.overwrite_from(&request);
                trade
            }
            None => Trade::from_request(&request),
        };

        // The date may have rolled over since validation.
        let today = self.clock.today();
        if trade.is_matured(today) && !trade.expired.is_expired() {
            debug!(%trade, %today, "Forcing expired flag on matured trade");
            trade.expired = Expired::Expired;
        }

        let saved = self.repo.save(trade).await?;

        info!(
            trade_id = %saved.trade_id,
            version = saved.version,
            storage_id = ?saved.storage_id,
            expired = %saved.expired,
            action = if overwrite { "overwrite" } else { "insert" },
            "Trade accepted"
        );
        Ok(saved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
