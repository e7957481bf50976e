use super::support::{quick_config, single_service, Reply, ScriptedRemote};
use invoke_guard::{
    AcquireMode, CallContext, CancelReason, Cancelled, CircuitState, InvokeError, Invocation,
    RateLimitMode, ServiceConfig,
};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_wait() {
    let remote = ScriptedRemote::always(Reply::Fail(503));
    let config = ServiceConfig {
        retry_base_delay_ms: 10_000,
        retry_max_delay_ms: 60_000,
        ..quick_config()
    };
    let invoker = single_service("llm", &config, &remote);
    let token = CancellationToken::new();
    let ctx = CallContext::with_token(token.clone());

    let task = {
        let invoker = invoker.clone();
        tokio::spawn(async move {
            invoker
                .invoke_with(Invocation::new("llm", "complete", json!({})), &ctx)
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        InvokeError::Cancelled(Cancelled {
            reason: CancelReason::Token
        })
    );
    assert_eq!(remote.calls(), 1);

    // an abandoned call is neither a success nor a failure for the breaker
    let health = invoker.health();
    assert_eq!(health.services[0].consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_blocked_acquire() {
    let remote = ScriptedRemote::always(Reply::Ok("x"));
    let config = ServiceConfig {
        rate_limit_capacity: 1,
        rate_limit_refill_per_second: 1.0 / 60.0,
        rate_limit_mode: RateLimitMode::Block,
        ..quick_config()
    };
    let invoker = single_service("images", &config, &remote);
    invoker.invoke("images", "op", json!(1)).await.unwrap();

    let start = tokio::time::Instant::now();
    let ctx = CallContext::new().timeout(Duration::from_secs(5));
    let err = invoker
        .invoke_with(Invocation::new("images", "op", json!(2)), &ctx)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        InvokeError::Cancelled(Cancelled {
            reason: CancelReason::DeadlineExceeded
        })
    );
    assert!(start.elapsed() < Duration::from_secs(6));
    assert_eq!(remote.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn blocked_acquire_succeeds_after_refill() {
    let remote = ScriptedRemote::always(Reply::Ok("x"));
    let config = ServiceConfig {
        rate_limit_capacity: 1,
        rate_limit_refill_per_second: 1.0,
        ..quick_config()
    };
    let invoker = single_service("images", &config, &remote);
    invoker.invoke("images", "op", json!(1)).await.unwrap();

    let start = tokio::time::Instant::now();
    invoker
        .invoke_with(
            Invocation::new("images", "op", json!(2)).admission(AcquireMode::block()),
            &CallContext::new(),
        )
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(remote.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn block_timeout_shorter_than_wait_rejects_at_once() {
    let remote = ScriptedRemote::always(Reply::Ok("x"));
    let config = ServiceConfig {
        rate_limit_capacity: 1,
        rate_limit_refill_per_second: 0.1,
        rate_limit_mode: RateLimitMode::Block,
        rate_limit_block_timeout_ms: Some(1_000),
        ..quick_config()
    };
    let invoker = single_service("images", &config, &remote);
    invoker.invoke("images", "op", json!(1)).await.unwrap();

    let start = tokio::time::Instant::now();
    let err = invoker.invoke("images", "op", json!(2)).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn deadline_aborts_in_flight_trial_and_frees_the_slot() {
    let remote = ScriptedRemote::scripted(
        vec![Reply::Fail(503), Reply::Slow(Duration::from_secs(60), "late")],
        Reply::Ok("trial"),
    );
    let config = ServiceConfig {
        breaker_failure_threshold: 1,
        breaker_open_timeout_seconds: 10,
        retry_max_attempts: 1,
        ..quick_config()
    };
    let invoker = single_service("llm", &config, &remote);

    let _ = invoker.invoke("llm", "op", json!(0)).await;
    assert_eq!(invoker.health().services[0].state, CircuitState::Open);
    tokio::time::advance(Duration::from_secs(11)).await;

    // the half-open trial hangs and is abandoned at its deadline
    let ctx = CallContext::new().timeout(Duration::from_secs(1));
    let err = invoker
        .invoke_with(Invocation::new("llm", "op", json!(1)), &ctx)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    // the slot is free again, so the next caller becomes the trial
    let body = invoker.invoke("llm", "op", json!(2)).await.unwrap();
    assert_eq!(body, "trial");
    assert_eq!(invoker.health().services[0].state, CircuitState::Closed);
}

#[tokio::test]
async fn already_cancelled_context_does_nothing() {
    let remote = ScriptedRemote::always(Reply::Ok("x"));
    let invoker = single_service("llm", &quick_config(), &remote);
    let token = CancellationToken::new();
    token.cancel();

    let err = invoker
        .invoke_with(
            Invocation::new("llm", "op", json!({})),
            &CallContext::with_token(token),
        )
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(remote.calls(), 0);
    assert_eq!(invoker.stats().cache_misses, 0);
}
