use super::support::{quick_config, single_service, Reply, ScriptedRemote};
use invoke_guard::{InvokeError, ServiceConfig};
use serde_json::json;

fn no_refill(capacity: u32) -> ServiceConfig {
    ServiceConfig {
        rate_limit_capacity: capacity,
        rate_limit_refill_per_second: 0.0,
        ..quick_config()
    }
}

#[tokio::test(start_paused = true)]
async fn cache_hits_bypass_the_rate_limiter() {
    let remote = ScriptedRemote::always(Reply::Ok("body"));
    let invoker = single_service("llm", &no_refill(1), &remote);

    for _ in 0..10 {
        invoker.invoke("llm", "complete", json!({ "q": "same" })).await.unwrap();
    }
    assert_eq!(remote.calls(), 1);

    let err = invoker
        .invoke("llm", "complete", json!({ "q": "different" }))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), None);
}

#[tokio::test(start_paused = true)]
async fn limiter_runs_before_breaker() {
    let remote = ScriptedRemote::always(Reply::Fail(500));
    let config = ServiceConfig {
        breaker_failure_threshold: 1,
        retry_max_attempts: 1,
        ..no_refill(2)
    };
    let invoker = single_service("images", &config, &remote);

    // token 1: reaches the remote and trips the breaker
    assert!(matches!(
        invoker.invoke("images", "op", json!(1)).await,
        Err(InvokeError::RetriesExhausted { .. })
    ));
    // token 2: admitted by the limiter, refused by the breaker
    assert!(invoker
        .invoke("images", "op", json!(2))
        .await
        .unwrap_err()
        .is_service_unavailable());
    // no tokens left: the limiter answers first
    assert!(invoker
        .invoke("images", "op", json!(3))
        .await
        .unwrap_err()
        .is_rate_limited());

    assert_eq!(remote.calls(), 1);
    let stats = invoker.stats();
    assert_eq!(stats.rejected_by_breaker, 1);
    assert_eq!(stats.rejected_by_rate_limit, 1);
}

#[tokio::test(start_paused = true)]
async fn rejections_do_not_touch_the_breaker() {
    let remote = ScriptedRemote::always(Reply::Ok("x"));
    let config = ServiceConfig {
        breaker_failure_threshold: 1,
        ..no_refill(1)
    };
    let invoker = single_service("llm", &config, &remote);

    invoker.invoke("llm", "a", json!(0)).await.unwrap();
    for i in 1..5 {
        assert!(invoker.invoke("llm", "a", json!(i)).await.unwrap_err().is_rate_limited());
    }
    let health = invoker.health();
    assert!(health.is_healthy());
    assert_eq!(health.services[0].consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn retries_reuse_one_admission() {
    let remote = ScriptedRemote::scripted(
        vec![Reply::Fail(503), Reply::Fail(429)],
        Reply::Ok("third time"),
    );
    let invoker = single_service("llm", &no_refill(1), &remote);

    let body = invoker
        .invoke("llm", "complete", json!({ "prompt": "p" }))
        .await
        .unwrap();
    assert_eq!(body, "third time");

    let attempts: Vec<usize> = remote.requests().iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    for request in remote.requests() {
        assert_eq!(request.service_id, "llm");
        assert_eq!(request.operation, "complete");
        assert_eq!(request.parameters, json!({ "prompt": "p" }));
    }

    // one token paid for all three attempts
    assert_eq!(invoker.health().services[0].available_tokens, 0.0);
    let stats = invoker.stats();
    assert_eq!(stats.remote_calls, 3);
    assert_eq!(stats.remote_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn success_after_retries_is_cached_and_closes_nothing() {
    let remote = ScriptedRemote::scripted(vec![Reply::Fail(502)], Reply::Ok("ok"));
    let config = ServiceConfig {
        breaker_failure_threshold: 1,
        ..quick_config()
    };
    let invoker = single_service("llm", &config, &remote);

    invoker.invoke("llm", "complete", json!(1)).await.unwrap();
    invoker.invoke("llm", "complete", json!(1)).await.unwrap();

    // a transient failure inside a successful retry loop is not a breaker failure
    assert!(invoker.health().is_healthy());
    assert_eq!(remote.calls(), 2);
}
