//! In-memory repository.
//!
//! Thread-safe via `tokio::sync::RwLock`. Data is lost on restart. Enforces
//! the same `(trade_id, version)` uniqueness the SQLite schema does, so that
//! tests against either backend fail the same way.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::TradeRepository;
use crate::types::{Expired, Trade};

#[derive(Debug)]
struct MemoryState {
    trades: Vec<Trade>,
    next_id: i64,
}

impl MemoryState {
    /// Validate and apply one write against the current contents.
    fn apply(&mut self, mut trade: Trade) -> Result<Trade> {
        let clash = self.trades.iter().any(|t| {
            t.trade_id == trade.trade_id
                && t.version == trade.version
                && t.storage_id != trade.storage_id
        });
        if clash {
            bail!(
                "Duplicate business key: trade {} version {} already stored",
                trade.trade_id,
                trade.version
            );
        }

        match trade.storage_id {
            Some(id) => {
                let Some(slot) = self.trades.iter_mut().find(|t| t.storage_id == Some(id)) else {
                    bail!("No trade with storage id {id}");
                };
                *slot = trade.clone();
            }
            None => {
                trade.storage_id = Some(self.next_id);
                self.next_id += 1;
                self.trades.push(trade.clone());
            }
        }
        Ok(trade)
    }
}

/// Process-local trade store.
pub struct InMemoryTradeRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryTradeRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                trades: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Snapshot of every stored trade, ordered by storage id.
    pub async fn all(&self) -> Vec<Trade> {
        self.state.read().await.trades.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.trades.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryTradeRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn find_by_trade_id(&self, trade_id: &str) -> Result<Vec<Trade>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .iter()
            .filter(|t| t.trade_id == trade_id)
            .cloned()
            .collect())
    }

    async fn find_by_trade_id_and_version_greater_than(
        &self,
        trade_id: &str,
        version: u32,
    ) -> Result<Vec<Trade>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .iter()
            .filter(|t| t.trade_id == trade_id && t.version > version)
            .cloned()
            .collect())
    }

    async fn find_exact_version(&self, trade_id: &str, version: u32) -> Result<Option<Trade>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .iter()
            .find(|t| t.trade_id == trade_id && t.version == version)
            .cloned())
    }

    async fn find_matured_not_expired(&self, as_of: NaiveDate) -> Result<Vec<Trade>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .iter()
            .filter(|t| t.is_matured(as_of) && t.expired == Expired::NotExpired)
            .cloned()
            .collect())
    }

    async fn save(&self, trade: Trade) -> Result<Trade> {
        self.state.write().await.apply(trade)
    }

    async fn save_all(&self, trades: Vec<Trade>) -> Result<Vec<Trade>> {
        let mut state = self.state.write().await;
        // Work on a copy so a failing trade leaves the store untouched.
        let mut staged = MemoryState {
            trades: state.trades.clone(),
            next_id: state.next_id,
        };
        let mut saved = Vec::with_capacity(trades.len());
        for trade in trades {
            saved.push(staged.apply(trade)?);
        }
        *state = staged;
        Ok(saved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
