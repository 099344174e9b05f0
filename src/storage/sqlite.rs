//! SQLite-backed repository.
//!
//! One `trades` table keyed by an autoincrement storage id, with a
//! `UNIQUE(trade_id, version)` constraint as a last line of defence for the
//! business key. Dates are stored as ISO-8601 text so range filters compare
//! lexically; the expiry flag is stored as `'N'` / `'Y'`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::TradeRepository;
use crate::types::{Expired, Trade};

const TRADE_COLUMNS: &str =
    "id, trade_id, version, counter_party_id, book_id, maturity_date, created_date, expired";

#[derive(Clone)]
pub struct SqliteTradeRepository {
    pool: SqlitePool,
}

impl SqliteTradeRepository {
    /// Connect to `db_url`, creating the database file and schema if missing.
    pub async fn connect(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path_part).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("Failed to create database directory")?;
                }
            }
        }

        let in_memory = db_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database url: {db_url}"))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to ":memory:" opens its own private database.
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!(db_url, "Connected to trade database");

        let repo = Self::new(pool);
        repo.init().await?;
        Ok(repo)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trade_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                counter_party_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                maturity_date TEXT NOT NULL,
                created_date TEXT NOT NULL,
                expired TEXT NOT NULL DEFAULT 'N',
                UNIQUE (trade_id, version)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_maturity_expired
            ON trades (maturity_date, expired);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create maturity index")?;

        debug!("Trade schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map one row of `TRADE_COLUMNS` into a `Trade`.
fn trade_from_row(row: &SqliteRow) -> Result<Trade> {
    let version: i64 = row.try_get("version")?;
    let expired: String = row.try_get("expired")?;
    Ok(Trade {
        storage_id: Some(row.try_get("id")?),
        trade_id: row.try_get("trade_id")?,
        version: u32::try_from(version)
            .with_context(|| format!("Stored version out of range: {version}"))?,
        counter_party_id: row.try_get("counter_party_id")?,
        book_id: row.try_get("book_id")?,
        maturity_date: row.try_get("maturity_date")?,
        created_date: row.try_get("created_date")?,
        expired: expired.parse::<Expired>()?,
    })
}

fn trades_from_rows(rows: &[SqliteRow]) -> Result<Vec<Trade>> {
    rows.iter().map(trade_from_row).collect()
}

/// Insert or update a single trade on an open connection or transaction.
async fn write_trade(conn: &mut SqliteConnection, mut trade: Trade) -> Result<Trade> {
    match trade.storage_id {
        Some(id) => {
            let result = sqlx::query(
                r#"
                UPDATE trades
                SET trade_id = ?, version = ?, counter_party_id = ?, book_id = ?,
                    maturity_date = ?, created_date = ?, expired = ?
                WHERE id = ?
                "#,
            )
            .bind(&trade.trade_id)
            .bind(i64::from(trade.version))
            .bind(&trade.counter_party_id)
            .bind(&trade.book_id)
            .bind(trade.maturity_date)
            .bind(trade.created_date)
            .bind(trade.expired.code())
            .bind(id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to update trade {} v{}", trade.trade_id, trade.version))?;

            if result.rows_affected() == 0 {
                anyhow::bail!("No trade with storage id {id}");
            }
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO trades
                (trade_id, version, counter_party_id, book_id, maturity_date, created_date, expired)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&trade.trade_id)
            .bind(i64::from(trade.version))
            .bind(&trade.counter_party_id)
            .bind(&trade.book_id)
            .bind(trade.maturity_date)
            .bind(trade.created_date)
            .bind(trade.expired.code())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert trade {} v{}", trade.trade_id, trade.version))?;

            trade.storage_id = Some(result.last_insert_rowid());
        }
    }
    Ok(trade)
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn find_by_trade_id(&self, trade_id: &str) -> Result<Vec<Trade>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = ? ORDER BY version"
        ))
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load trades for {trade_id}"))?;
        trades_from_rows(&rows)
    }

    async fn find_by_trade_id_and_version_greater_than(
        &self,
        trade_id: &str,
        version: u32,
    ) -> Result<Vec<Trade>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = ? AND version > ? ORDER BY version"
        ))
        .bind(trade_id)
        .bind(i64::from(version))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load newer versions of {trade_id}"))?;
        trades_from_rows(&rows)
    }

    async fn find_exact_version(&self, trade_id: &str, version: u32) -> Result<Option<Trade>> {
        let row = sqlx::query(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = ? AND version = ?"
        ))
        .bind(trade_id)
        .bind(i64::from(version))
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load trade {trade_id} v{version}"))?;

        row.as_ref().map(trade_from_row).transpose()
    }

    async fn find_matured_not_expired(&self, as_of: NaiveDate) -> Result<Vec<Trade>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE maturity_date < ? AND expired = ?"
        ))
        .bind(as_of)
        .bind(Expired::NotExpired.code())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load matured trades")?;
        trades_from_rows(&rows)
    }

    async fn save(&self, trade: Trade) -> Result<Trade> {
        let mut conn = self.pool.acquire().await?;
        write_trade(&mut conn, trade).await
    }

    async fn save_all(&self, trades: Vec<Trade>) -> Result<Vec<Trade>> {
        if trades.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;
        let mut saved = Vec::with_capacity(trades.len());
        for trade in trades {
            saved.push(write_trade(&mut tx, trade).await?);
        }
        tx.commit().await.context("Failed to commit trade batch")?;

        debug!(count = saved.len(), "Trade batch saved");
        Ok(saved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
