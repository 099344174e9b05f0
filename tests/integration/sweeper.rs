//! Expiry sweeper behaviour, one-shot and as a running background task.

mod flaky_repository;

use chrono::{Duration as ChronoDuration, NaiveDate};
use std::sync::Arc;
use std::time::Duration;

use flaky_repository::FlakyRepository;
use tradestore::engine::clock::{Clock, FixedClock};
use tradestore::engine::TradeStore;
use tradestore::storage::{SqliteTradeRepository, TradeRepository};
use tradestore::types::{Expired, TradeStoreError, TradeUpdateRequest};

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn request(trade_id: &str, maturity: NaiveDate) -> TradeUpdateRequest {
    TradeUpdateRequest {
        trade_id: trade_id.to_string(),
        version: 1,
        counter_party_id: "CP-1".to_string(),
        book_id: "B1".to_string(),
        maturity_date: maturity,
        created_date: start_date(),
        expired: Expired::NotExpired,
    }
}

/// Poll until `check` passes or two seconds elapse.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_sweep_converges_on_sqlite() {
    let repo = Arc::new(SqliteTradeRepository::connect("sqlite::memory:").await.unwrap());
    let clock = Arc::new(FixedClock::new(start_date()));
    let store = TradeStore::with_clock(repo.clone(), clock.clone());

    for day in 0..10 {
        let maturity = start_date() + ChronoDuration::days(day);
        store.submit(request(&format!("T{day}"), maturity)).await.unwrap();
    }

    // Five days on, trades maturing on days 0..=4 have passed.
    clock.set(start_date() + ChronoDuration::days(5));
    let report = store.sweep_once().await.unwrap();
    assert_eq!(report.expired, 5);
    assert!(repo
        .find_matured_not_expired(clock.today())
        .await
        .unwrap()
        .is_empty());

    let again = store.sweep_once().await.unwrap();
    assert_eq!(again.expired, 0);

    for day in 0..10 {
        let trade = &store.versions_of(&format!("T{day}")).await.unwrap()[0];
        assert_eq!(trade.expired.is_expired(), day < 5, "T{day}");
    }
}

#[tokio::test]
async fn test_background_sweeper_flips_after_date_moves() {
    let repo = Arc::new(FlakyRepository::new());
    let clock = Arc::new(FixedClock::new(start_date()));
    let store = TradeStore::with_clock(repo.clone(), clock.clone());
    store.submit(request("T1", start_date())).await.unwrap();

    let handle = store.start_sweeper(10);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!repo.snapshot().await[0].expired.is_expired());

    clock.advance_days(1);
    let flipped = eventually(|| {
        let repo = repo.clone();
        async move { repo.snapshot().await[0].expired.is_expired() }
    })
    .await;
    assert!(flipped, "sweeper never expired the matured trade");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_background_sweeper_recovers_from_failures() {
    let repo = Arc::new(FlakyRepository::new());
    let clock = Arc::new(FixedClock::new(start_date()));
    let store = TradeStore::with_clock(repo.clone(), clock.clone());
    store.submit(request("T1", start_date())).await.unwrap();
    clock.advance_days(3);

    repo.fail_reads("database is locked");
    let handle = store.start_sweeper(10);

    let reads_before = repo.read_count();
    assert!(eventually(|| {
        let repo = repo.clone();
        async move { repo.read_count() >= reads_before + 3 }
    })
    .await);
    assert!(!handle.is_finished(), "a failed tick must not end the sweeper");
    assert!(!repo.snapshot().await[0].expired.is_expired());

    repo.heal();
    assert!(eventually(|| {
        let repo = repo.clone();
        async move { repo.snapshot().await[0].expired.is_expired() }
    })
    .await);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweeps_interleaved_with_submissions_keep_invariants() {
    let repo = Arc::new(FlakyRepository::with_read_delay(Duration::from_millis(1)));
    let clock = Arc::new(FixedClock::new(start_date()));
    let store = Arc::new(TradeStore::with_clock(repo.clone(), clock.clone()));

    let handle = store.start_sweeper(1);

    let mut tasks = Vec::new();
    for i in 0..40u32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut req = request(&format!("T{}", i % 5), start_date() + ChronoDuration::days(1));
            req.version = i / 5;
            store.submit(req).await
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) | Err(TradeStoreError::StaleVersion { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    clock.advance_days(2);
    assert!(eventually(|| {
        let repo = repo.clone();
        async move { repo.snapshot().await.iter().all(|t| t.expired.is_expired()) }
    })
    .await);
    handle.shutdown().await.unwrap();

    let stored = repo.snapshot().await;
    assert!(!stored.is_empty());
    let mut keys: Vec<(String, u32)> = stored.iter().map(|t| (t.trade_id.clone(), t.version)).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), stored.len(), "duplicate business key stored");
}

#[tokio::test]
async fn test_shutdown_is_prompt_with_long_interval() {
    let repo = Arc::new(FlakyRepository::new());
    let store = TradeStore::with_clock(repo, Arc::new(FixedClock::new(start_date())));

    let handle = store.start_sweeper(86_400_000);
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("sweeper did not stop promptly")
        .unwrap();
}
