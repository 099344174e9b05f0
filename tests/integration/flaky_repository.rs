//! Fault-injecting repository for integration testing.
//!
//! Wraps `InMemoryTradeRepository` and lets test code force read or write
//! failures and slow down reads, which widens the window between a
//! submission's read and its write.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tradestore::storage::{InMemoryTradeRepository, TradeRepository};
use tradestore::types::Trade;

/// A repository whose failures and latency are controlled from test code.
pub struct FlakyRepository {
    inner: InMemoryTradeRepository,
    /// If set, every read returns this error.
    read_error: Mutex<Option<String>>,
    /// If set, every write returns this error.
    write_error: Mutex<Option<String>>,
    read_delay: Mutex<Duration>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self {
            inner: InMemoryTradeRepository::new(),
            read_error: Mutex::new(None),
            write_error: Mutex::new(None),
            read_delay: Mutex::new(Duration::ZERO),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every read.
    pub fn with_read_delay(delay: Duration) -> Self {
        let repo = Self::new();
        *repo.read_delay.lock().unwrap() = delay;
        repo
    }

    pub fn fail_reads(&self, msg: &str) {
        *self.read_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_writes(&self, msg: &str) {
        *self.write_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced errors.
    pub fn heal(&self) {
        *self.read_error.lock().unwrap() = None;
        *self.write_error.lock().unwrap() = None;
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every stored trade, bypassing fault injection.
    pub async fn snapshot(&self) -> Vec<Trade> {
        self.inner.all().await
    }

    async fn before_read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.read_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn before_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.write_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(())
    }
}

#[async_trait]
impl TradeRepository for FlakyRepository {
    async fn find_by_trade_id(&self, trade_id: &str) -> Result<Vec<Trade>> {
        self.before_read().await?;
        self.inner.find_by_trade_id(trade_id).await
    }

    async fn find_by_trade_id_and_version_greater_than(
        &self,
        trade_id: &str,
        version: u32,
    ) -> Result<Vec<Trade>> {
        self.before_read().await?;
        self.inner
            .find_by_trade_id_and_version_greater_than(trade_id, version)
            .await
    }

    async fn find_exact_version(&self, trade_id: &str, version: u32) -> Result<Option<Trade>> {
        self.before_read().await?;
        self.inner.find_exact_version(trade_id, version).await
    }

    async fn find_matured_not_expired(&self, as_of: NaiveDate) -> Result<Vec<Trade>> {
        self.before_read().await?;
        self.inner.find_matured_not_expired(as_of).await
    }

    async fn save(&self, trade: Trade) -> Result<Trade> {
        self.before_write()?;
        self.inner.save(trade).await
    }

    async fn save_all(&self, trades: Vec<Trade>) -> Result<Vec<Trade>> {
        self.before_write()?;
        self.inner.save_all(trades).await
    }
}
