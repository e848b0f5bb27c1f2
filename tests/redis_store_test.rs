// ============================================================================
// Redis Stream Store Integration Tests
// ============================================================================
//
// These tests require a Redis instance (local or test container).
//
// Run with: cargo test --test redis_store_test -- --ignored
// (Tests are marked with #[ignore] to skip unless Redis is available)
//
// ============================================================================

use std::env;
use std::sync::Arc;
use std::time::Duration;

use redis::cmd;
use serde_json::json;
use serial_test::serial;
use tracing_subscriber::EnvFilter;

use rivulet::{Config, Error, LogStore, RedisStreamStore};

const TEST_SUFFIX: &str = "it";
const TEST_GROUP: &str = "test-group";

/// Route store logs through the test harness, honoring `RUST_LOG`.
/// Safe to call from every test; only the first call installs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Store wired to the test Redis, with every key namespaced by a suffix
/// so cleanup can sweep them wholesale.
async fn create_test_store() -> RedisStreamStore {
    init_tracing();
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let config = Config {
        redis_url,
        group_name: TEST_GROUP.to_string(),
        suffix: Some(TEST_SUFFIX.to_string()),
        min_idle_time_ms: 0,
        dead_consumer_timeout_ms: 0,
        ..Config::default()
    };

    RedisStreamStore::connect(Arc::new(config))
        .await
        .expect("Failed to connect to Redis for tests")
}

/// Delete every key carrying the test suffix.
async fn cleanup_test_keys() {
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url.as_str()).expect("Failed to create Redis client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to create Redis connection");

    let keys: Vec<String> = cmd("KEYS")
        .arg(format!("*-{}", TEST_SUFFIX))
        .query_async(&mut conn)
        .await
        .unwrap_or_default();

    if !keys.is_empty() {
        let _: () = cmd("DEL")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis - run with: cargo test --test redis_store_test -- --ignored
async fn test_group_lifecycle() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    assert!(!store.group_exists("orders", TEST_GROUP).await.unwrap());

    store.create_group("orders", TEST_GROUP).await.unwrap();
    assert!(store.group_exists("orders", TEST_GROUP).await.unwrap());

    store.delete_group("orders", TEST_GROUP).await.unwrap();
    assert!(!store.group_exists("orders", TEST_GROUP).await.unwrap());

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_publish_read_ack_cycle() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    // group at "$" before publishing so the append is visible to it
    store.create_group("orders", TEST_GROUP).await.unwrap();
    let id = store
        .publish("orders", "order_created", &json!({"id": 42, "total": "19.90"}))
        .await
        .unwrap();

    let messages = store.read_next("orders", TEST_GROUP, "worker-a").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].event, "order_created");
    assert_eq!(messages[0].payload, json!({"id": 42, "total": "19.90"}));
    assert_eq!(messages[0].delivery_count, 1);

    let summary = store.pending("orders", TEST_GROUP).await.unwrap();
    assert_eq!(summary.size, 1);
    assert_eq!(summary.consumers.get("worker-a"), Some(&1));

    store.ack("orders", TEST_GROUP, &id).await.unwrap();
    let summary = store.pending("orders", TEST_GROUP).await.unwrap();
    assert_eq!(summary.size, 0);

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_claim_moves_pending_entry_between_consumers() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    store.create_group("orders", TEST_GROUP).await.unwrap();
    let id = store.publish("orders", "order_created", &json!(1)).await.unwrap();

    // worker-a reads but never acks
    let messages = store.read_next("orders", TEST_GROUP, "worker-a").await.unwrap();
    assert_eq!(messages.len(), 1);

    let claimed = store
        .claim_stuck("orders", TEST_GROUP, "worker-b", Duration::from_millis(0))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);
    assert_eq!(claimed[0].delivery_count, 2);

    let summary = store.pending("orders", TEST_GROUP).await.unwrap();
    assert_eq!(summary.consumers.get("worker-b"), Some(&1));
    assert_eq!(summary.consumers.get("worker-a"), None);

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_claim_respects_idle_threshold() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    store.create_group("orders", TEST_GROUP).await.unwrap();
    store.publish("orders", "order_created", &json!(1)).await.unwrap();
    store.read_next("orders", TEST_GROUP, "worker-a").await.unwrap();

    // entry was touched just now, far below the idle threshold
    let claimed = store
        .claim_stuck("orders", TEST_GROUP, "worker-b", Duration::from_secs(600))
        .await
        .unwrap();
    assert!(claimed.is_empty());

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_ack_of_unknown_id_reports_mismatch() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    store.create_group("orders", TEST_GROUP).await.unwrap();
    store.publish("orders", "order_created", &json!(1)).await.unwrap();

    let err = store.ack("orders", TEST_GROUP, "99999999-0").await.unwrap_err();
    assert!(matches!(err, Error::AckMismatch { count: 0, .. }));

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_read_one_peeks_without_a_group() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    assert_eq!(store.read_one("orders").await.unwrap(), None);

    store.create_group("orders", TEST_GROUP).await.unwrap();
    store.publish("orders", "order_created", &json!({"id": 1})).await.unwrap();
    store.publish("orders", "order_updated", &json!({"id": 2})).await.unwrap();

    let peeked = store.read_one("orders").await.unwrap().unwrap();
    assert_eq!(peeked.event, "order_created");
    assert_eq!(peeked.payload, json!({"id": 1}));
    assert_eq!(peeked.delivery_count, 0);

    // the peek did not consume anything on behalf of the group
    let messages = store.read_next("orders", TEST_GROUP, "worker-a").await.unwrap();
    assert_eq!(messages.len(), 2);

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_claim_after_truncate_converges_without_error() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    store.create_group("orders", TEST_GROUP).await.unwrap();
    store.publish("orders", "order_created", &json!(1)).await.unwrap();
    store.read_next("orders", TEST_GROUP, "worker-a").await.unwrap();
    assert_eq!(store.pending("orders", TEST_GROUP).await.unwrap().size, 1);

    // the entry is gone but its pending record survives the trim
    store.truncate("orders").await.unwrap();

    // reclaiming the tombstone must neither dispatch it nor error out,
    // and afterwards nothing is left pending
    let claimed = store
        .claim_stuck("orders", TEST_GROUP, "worker-b", Duration::from_millis(0))
        .await
        .unwrap();
    assert!(claimed.is_empty());
    assert_eq!(store.pending("orders", TEST_GROUP).await.unwrap().size, 0);

    cleanup_test_keys().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn test_truncate_empties_the_stream() {
    cleanup_test_keys().await;
    let store = create_test_store().await;

    store.create_group("orders", TEST_GROUP).await.unwrap();
    store.publish("orders", "order_created", &json!(1)).await.unwrap();
    store.publish("orders", "order_updated", &json!(2)).await.unwrap();

    let removed = store.truncate("orders").await.unwrap();
    assert_eq!(removed, 2);

    let messages = store.read_next("orders", TEST_GROUP, "worker-a").await.unwrap();
    assert!(messages.is_empty());

    cleanup_test_keys().await;
}
