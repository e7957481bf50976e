use super::helpers::*;
use bytes::Bytes;
use invoke_guard::{Invoker, RemoteError, RemoteRequest, ServiceConfig, ServiceRegistry};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn invoke_call_metrics() {
    init_recorder();

    let remote = tower::service_fn(|req: RemoteRequest| async move {
        if req.operation == "broken" {
            Err(RemoteError::terminal("rejected by upstream"))
        } else {
            Ok(Bytes::from_static(b"ok"))
        }
    });
    let mut registry = ServiceRegistry::new();
    registry
        .register("metrics_svc", &ServiceConfig::default(), Arc::new(remote))
        .unwrap();
    let invoker = Invoker::builder(registry).build();

    invoker
        .invoke("metrics_svc", "fine", json!({}))
        .await
        .unwrap();
    invoker
        .invoke("metrics_svc", "fine", json!({}))
        .await
        .unwrap();
    assert!(invoker
        .invoke("metrics_svc", "broken", json!({}))
        .await
        .is_err());

    assert_counter_exists("invoke_calls_total");
    assert_metric_has_label("invoke_calls_total", "service", "metrics_svc");
    assert_metric_has_label("invoke_calls_total", "outcome", "success");
    assert_metric_has_label("invoke_calls_total", "outcome", "terminal");

    assert_histogram_exists("invoke_call_duration_seconds");
    assert_metric_has_label("invoke_call_duration_seconds", "service", "metrics_svc");

    // cache hits surface through the facade's shared cache
    assert_metric_has_label("cache_requests_total", "cache", "invoke-guard");
}
