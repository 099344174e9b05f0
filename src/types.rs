//! Shared types for the trade store.
//!
//! The stored `Trade` record, the transient `TradeUpdateRequest` consumed by
//! ingestion, the two-state expiry flag and the domain error type. Engine,
//! storage and API modules all depend on these without depending on each other.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Expiry flag
// ---------------------------------------------------------------------------

/// Whether a trade has passed its maturity date.
///
/// The only legal transition is `NotExpired -> Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Expired {
    #[default]
    #[serde(rename = "N")]
    NotExpired,
    #[serde(rename = "Y")]
    Expired,
}

impl Expired {
    /// Single-letter code used on the wire and in the database.
    pub fn code(&self) -> &'static str {
        match self {
            Expired::NotExpired => "N",
            Expired::Expired => "Y",
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Expired::Expired)
    }
}

impl fmt::Display for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Expired {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "N" => Ok(Expired::NotExpired),
            "Y" => Ok(Expired::Expired),
            other => anyhow::bail!("Unknown expired flag: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A stored trade revision.
///
/// `(trade_id, version)` is the business key; `storage_id` is assigned by the
/// repository on first insert and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// `None` until the repository has persisted the trade.
    pub storage_id: Option<i64>,
    pub trade_id: String,
    pub version: u32,
    pub counter_party_id: String,
    pub book_id: String,
    pub maturity_date: NaiveDate,
    pub created_date: NaiveDate,
    pub expired: Expired,
}

impl Trade {
    /// A fresh, not yet persisted trade built from a request.
    pub fn from_request(request: &TradeUpdateRequest) -> Self {
        Self {
            storage_id: None,
            trade_id: request.trade_id.clone(),
            version: request.version,
            counter_party_id: request.counter_party_id.clone(),
            book_id: request.book_id.clone(),
            maturity_date: request.maturity_date,
            created_date: request.created_date,
            expired: request.expired,
        }
    }

    /// Overwrite every mutable field from the request.
    ///
    /// Storage identity and the business key are left untouched.
    pub fn overwrite_from(&mut self, request: &TradeUpdateRequest) {
        self.counter_party_id = request.counter_party_id.clone();
        self.book_id = request.book_id.clone();
        self.maturity_date = request.maturity_date;
        self.created_date = request.created_date;
        self.expired = request.expired;
    }

    /// Maturity strictly before `today`.
    pub fn is_matured(&self, today: NaiveDate) -> bool {
        self.maturity_date < today
    }

    pub fn is_persisted(&self) -> bool {
        self.storage_id.is_some()
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} (cp: {} | book: {} | matures: {} | expired: {})",
            self.trade_id,
            self.version,
            self.counter_party_id,
            self.book_id,
            self.maturity_date,
            self.expired,
        )
    }
}

// ---------------------------------------------------------------------------
// Update request
// ---------------------------------------------------------------------------

/// An incoming trade submission. Consumed once by the ingestion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeUpdateRequest {
    pub trade_id: String,
    pub version: u32,
    pub counter_party_id: String,
    pub book_id: String,
    pub maturity_date: NaiveDate,
    pub created_date: NaiveDate,
    #[serde(default)]
    pub expired: Expired,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors returned by the ingestion engine.
#[derive(Debug, thiserror::Error)]
pub enum TradeStoreError {
    #[error("Invalid maturity date: {maturity_date} is before {today}")]
    InvalidMaturityDate {
        maturity_date: NaiveDate,
        today: NaiveDate,
    },

    #[error("Stale version for trade {trade_id}: received v{requested}, store holds v{latest}")]
    StaleVersion {
        trade_id: String,
        requested: u32,
        latest: u32,
    },

    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

impl TradeStoreError {
    /// Whether the failure was caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TradeStoreError::InvalidMaturityDate { .. } | TradeStoreError::StaleVersion { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
