//! Integration tests for the Redis counter store.
//!
//! These tests require a Redis instance at `redis://127.0.0.1/` and are
//! ignored by default. Run with `cargo test --test redis_store -- --ignored`.

use std::time::Duration;

use chrono::{TimeZone, Utc};

use floodgate::config::FloodgateOptions;
use floodgate::store::{CounterStore, RedisStore};

const REDIS_URL: &str = "redis://127.0.0.1/";

/// Check whether Redis is reachable before running a test body.
async fn redis_available() -> bool {
    RedisStore::connect(REDIS_URL).await.is_ok()
}

/// Per-run key prefix so repeated runs never see stale state.
fn test_namespace(test_name: &str) -> String {
    format!("floodgate-test:{}:{}", std::process::id(), test_name)
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_set_then_get() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let store = RedisStore::connect(REDIS_URL).await.unwrap();
    let key = format!("{}:value", test_namespace("set_get"));

    store.set(&key, "7", Duration::from_secs(30)).await.unwrap();

    assert_eq!(store.get(&key).await.unwrap(), Some("7".to_string()));
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_absent_key_is_none() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let store = RedisStore::connect(REDIS_URL).await.unwrap();
    let key = format!("{}:missing", test_namespace("absent"));

    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_entries_expire() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let store = RedisStore::connect(REDIS_URL).await.unwrap();
    let key = format!("{}:value", test_namespace("expire"));

    store.set(&key, "1", Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_increment_counts_up() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let store = RedisStore::connect(REDIS_URL).await.unwrap();
    let key = format!("{}:count", test_namespace("increment"));

    assert_eq!(store.increment(&key, Duration::from_secs(30)).await.unwrap(), 1);
    assert_eq!(store.increment(&key, Duration::from_secs(30)).await.unwrap(), 2);
    assert_eq!(store.increment(&key, Duration::from_secs(30)).await.unwrap(), 3);
}

/// Both backends must make identical decisions for identical, uncontended
/// input sequences.
#[tokio::test]
#[ignore] // Requires Redis
async fn test_backend_decision_parity() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let at = |secs: i64| Utc.timestamp_opt(secs, 0).unwrap();
    let sequence = [0i64, 10, 20, 25, 61, 81, 85, 142, 143];

    let memory_engine = FloodgateOptions::new()
        .use_memory_store()
        .throttle("payments", "export", Duration::from_secs(60), 3)
        .unwrap()
        .build()
        .await
        .unwrap();

    let redis_engine = FloodgateOptions::new()
        .use_redis_store(REDIS_URL)
        .namespace(test_namespace("parity"))
        .throttle("payments", "export", Duration::from_secs(60), 3)
        .unwrap()
        .build()
        .await
        .unwrap();

    for t in sequence {
        let memory = memory_engine
            .evaluate("payments", "export", "10.1.2.3", at(t))
            .await
            .unwrap();
        let redis = redis_engine
            .evaluate("payments", "export", "10.1.2.3", at(t))
            .await
            .unwrap();

        assert_eq!(memory, redis, "backends diverged at t={}", t);
    }
}
