//! Persistence layer.
//!
//! Defines the `TradeRepository` trait consumed by the ingestion engine and
//! the expiry sweeper, and provides two implementations:
//! - `InMemoryTradeRepository`: process-local, used by tests and demos
//! - `SqliteTradeRepository`: durable storage via `sqlx`
//!
//! Implementations are not expected to serialise read-decide-write sequences
//! themselves; the engine holds the store lock around every such sequence.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::Trade;

pub use memory::InMemoryTradeRepository;
pub use sqlite::SqliteTradeRepository;

/// Abstraction over the trade store.
///
/// Result sets are unordered unless stated otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Every stored version of a trade id.
    async fn find_by_trade_id(&self, trade_id: &str) -> Result<Vec<Trade>>;

    /// Stored versions of a trade id strictly newer than `version`.
    async fn find_by_trade_id_and_version_greater_than(
        &self,
        trade_id: &str,
        version: u32,
    ) -> Result<Vec<Trade>>;

    /// The trade stored under exactly `(trade_id, version)`, if any.
    async fn find_exact_version(&self, trade_id: &str, version: u32) -> Result<Option<Trade>>;

    /// Trades maturing strictly before `as_of` whose flag is still `N`.
    async fn find_matured_not_expired(&self, as_of: NaiveDate) -> Result<Vec<Trade>>;

    /// Insert when `storage_id` is `None`, otherwise update by identity.
    /// Returns the trade as stored, with its identity populated.
    async fn save(&self, trade: Trade) -> Result<Trade>;

    /// Save a batch. Either every trade is written or none is.
    async fn save_all(&self, trades: Vec<Trade>) -> Result<Vec<Trade>>;
}
