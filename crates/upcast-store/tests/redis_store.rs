//! Redis backend integration tests.
//!
//! Run against a local Redis with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use upcast_models::AnalysisResult;
use upcast_store::{AnalysisCache, QuotaLedger, RedisAnalysisCache, RedisQuotaLedger, RedisStoreConfig};

fn test_config() -> RedisStoreConfig {
    RedisStoreConfig {
        redis_url: std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        // Unique prefix per run so tests never collide
        key_prefix: format!("upcast-test-{}", uuid::Uuid::new_v4()),
    }
}

fn sample_analysis() -> AnalysisResult {
    AnalysisResult {
        category: "technology".into(),
        content_type: "review".into(),
        keywords: vec!["phone".into()],
        products: vec![],
        confidence: 0.8,
    }
}

/// Quota invariant against real Redis: N racing reservers, limit wins.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_reserve_respects_limit_under_concurrency() {
    let ledger = Arc::new(RedisQuotaLedger::new(&test_config()).expect("ledger client"));
    let day = Utc::now().date_naive();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.try_reserve("ch-1", day, 3).await.expect("reserve")
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 3);
    assert_eq!(ledger.used("ch-1", day).await.unwrap(), 3);
}

/// Release never takes a counter below zero.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_release_floors_at_zero() {
    let ledger = RedisQuotaLedger::new(&test_config()).expect("ledger client");
    let day = Utc::now().date_naive();

    ledger.release("ch-1", day).await.expect("release on empty");
    assert_eq!(ledger.used("ch-1", day).await.unwrap(), 0);

    assert!(ledger.try_reserve("ch-1", day, 2).await.unwrap());
    ledger.release("ch-1", day).await.unwrap();
    assert_eq!(ledger.used("ch-1", day).await.unwrap(), 0);
}

/// Usage projection covers every channel reserved today.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_usage_projection() {
    let ledger = RedisQuotaLedger::new(&test_config()).expect("ledger client");
    let day = Utc::now().date_naive();

    ledger.try_reserve("ch-a", day, 5).await.unwrap();
    ledger.try_reserve("ch-a", day, 5).await.unwrap();
    ledger.try_reserve("ch-b", day, 5).await.unwrap();

    let usage = ledger.usage(day).await.unwrap();
    assert_eq!(usage.get("ch-a"), Some(&2));
    assert_eq!(usage.get("ch-b"), Some(&1));
}

/// Cache roundtrip, idempotent overwrite, and expiry.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_cache_roundtrip_and_expiry() {
    let cache = RedisAnalysisCache::new(&test_config()).expect("cache client");

    cache
        .store("hash-1", sample_analysis(), Duration::from_secs(60))
        .await;
    cache
        .store("hash-1", sample_analysis(), Duration::from_secs(60))
        .await;
    assert_eq!(cache.lookup("hash-1").await, Some(sample_analysis()));

    cache
        .store("hash-2", sample_analysis(), Duration::from_secs(1))
        .await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(cache.lookup("hash-2").await.is_none());
}
