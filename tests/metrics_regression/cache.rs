use super::helpers::*;
use bytes::Bytes;
use invoke_guard::{Cache, Fingerprint};
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn cache_request_metrics() {
    init_recorder();

    let cache = Cache::builder().name("metrics_cache").max_entries(1).build();
    let first = Fingerprint::of("svc", "op", &json!({ "n": 1 }));
    let second = Fingerprint::of("svc", "op", &json!({ "n": 2 }));

    assert!(cache.get(&first).await.is_none());
    cache.put(&first, Bytes::from_static(b"a"), Duration::from_secs(60)).await;
    assert!(cache.get(&first).await.is_some());
    cache.put(&second, Bytes::from_static(b"b"), Duration::from_secs(60)).await;

    assert_counter_exists("cache_requests_total");
    assert_metric_has_label("cache_requests_total", "cache", "metrics_cache");
    assert_metric_has_label("cache_requests_total", "result", "hit");
    assert_metric_has_label("cache_requests_total", "result", "miss");

    assert_counter_exists("cache_evictions_total");
    assert_metric_has_label("cache_evictions_total", "cache", "metrics_cache");

    assert_gauge_exists("cache_size");
    assert_metric_has_label("cache_size", "cache", "metrics_cache");
}

#[tokio::test]
#[serial]
async fn cache_corruption_metric() {
    init_recorder();

    let dir = tempfile::tempdir().unwrap();
    let backend = invoke_guard::FileBackend::open(dir.path()).await.unwrap();
    let cache = Cache::builder()
        .name("metrics_corrupt")
        .backend(std::sync::Arc::new(backend))
        .build();

    let key = Fingerprint::of("svc", "op", &json!({}));
    std::fs::write(dir.path().join(format!("{}.json", key.as_str())), b"{ nope").unwrap();
    assert!(cache.get(&key).await.is_none());

    assert_counter_exists("cache_corruptions_total");
    assert_metric_has_label("cache_corruptions_total", "cache", "metrics_corrupt");
}
