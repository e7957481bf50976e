use super::support::{quick_config, single_service, Reply, ScriptedRemote};
use invoke_guard::{CircuitState, InvokeError, ServiceConfig};
use serde_json::json;
use std::time::Duration;

fn breaker_config() -> ServiceConfig {
    ServiceConfig {
        breaker_failure_threshold: 3,
        breaker_open_timeout_seconds: 30,
        retry_max_attempts: 1,
        ..quick_config()
    }
}

#[tokio::test(start_paused = true)]
async fn three_failures_open_then_single_trial() {
    let remote = ScriptedRemote::scripted(
        vec![Reply::Fail(503), Reply::Fail(503), Reply::Fail(503)],
        Reply::Ok("recovered"),
    );
    let invoker = single_service("images", &breaker_config(), &remote);

    for i in 0..3 {
        let err = invoker
            .invoke("images", "illustrate", json!({ "slide": i }))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::RetriesExhausted { attempts: 1, .. }));
    }
    assert_eq!(remote.calls(), 3);
    assert_eq!(invoker.health().services[0].state, CircuitState::Open);

    // within the open window: rejected, remote untouched
    tokio::time::advance(Duration::from_secs(10)).await;
    let err = invoker
        .invoke("images", "illustrate", json!({ "slide": 3 }))
        .await
        .unwrap_err();
    assert!(err.is_service_unavailable());
    assert!(err.retry_after().is_some_and(|d| d <= Duration::from_secs(20)));
    assert_eq!(remote.calls(), 3);
    assert_eq!(invoker.stats().rejected_by_breaker, 1);

    // after the timeout exactly one trial goes out and closes the breaker
    tokio::time::advance(Duration::from_secs(21)).await;
    let body = invoker
        .invoke("images", "illustrate", json!({ "slide": 3 }))
        .await
        .unwrap();
    assert_eq!(body, "recovered");
    assert_eq!(remote.calls(), 4);

    let health = invoker.health();
    assert_eq!(health.services[0].state, CircuitState::Closed);
    assert_eq!(health.services[0].consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens_and_restarts_timeout() {
    let remote = ScriptedRemote::always(Reply::Fail(500));
    let invoker = single_service("images", &breaker_config(), &remote);

    for i in 0..3 {
        let _ = invoker.invoke("images", "op", json!(i)).await;
    }
    tokio::time::advance(Duration::from_secs(31)).await;

    let err = invoker.invoke("images", "op", json!("trial")).await.unwrap_err();
    assert!(matches!(err, InvokeError::RetriesExhausted { .. }));
    assert_eq!(remote.calls(), 4);
    assert_eq!(invoker.health().services[0].state, CircuitState::Open);

    // the timeout restarted at the failed trial
    tokio::time::advance(Duration::from_secs(15)).await;
    let err = invoker.invoke("images", "op", json!("again")).await.unwrap_err();
    assert!(err.is_service_unavailable());
    assert_eq!(remote.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_get_one_trial() {
    let remote = ScriptedRemote::scripted(
        vec![Reply::Fail(503), Reply::Fail(503), Reply::Fail(503)],
        Reply::Slow(Duration::from_millis(500), "slow recovery"),
    );
    let invoker = single_service("images", &breaker_config(), &remote);

    for i in 0..3 {
        let _ = invoker.invoke("images", "op", json!(i)).await;
    }
    tokio::time::advance(Duration::from_secs(31)).await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let invoker = invoker.clone();
            tokio::spawn(async move { invoker.invoke("images", "op", json!({ "caller": i })).await })
        })
        .collect();

    let mut ok = 0;
    let mut unavailable = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) if e.is_service_unavailable() => unavailable += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(unavailable, 7);
    assert_eq!(remote.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn terminal_errors_also_count() {
    let remote = ScriptedRemote::always(Reply::Fail(401));
    let invoker = single_service("llm", &breaker_config(), &remote);

    for _ in 0..3 {
        let err = invoker.invoke("llm", "complete", json!({})).await.unwrap_err();
        assert!(matches!(err, InvokeError::Terminal(_)));
    }
    assert_eq!(invoker.health().services[0].state, CircuitState::Open);
    assert!(!invoker.health().is_healthy());
}

#[tokio::test(start_paused = true)]
async fn success_resets_the_failure_count() {
    let remote = ScriptedRemote::scripted(
        vec![
            Reply::Fail(503),
            Reply::Fail(503),
            Reply::Ok("fine"),
            Reply::Fail(503),
            Reply::Fail(503),
        ],
        Reply::Ok("fine"),
    );
    let invoker = single_service("llm", &breaker_config(), &remote);

    for i in 0..5 {
        let _ = invoker.invoke("llm", "complete", json!(i)).await;
    }
    let health = invoker.health();
    assert_eq!(health.services[0].state, CircuitState::Closed);
    assert_eq!(health.services[0].consecutive_failures, 2);
}
