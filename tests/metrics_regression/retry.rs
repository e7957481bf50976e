use super::helpers::*;
use invoke_guard::{CallContext, RemoteError, RetryExecutor};
use invoke_guard_retry::FixedInterval;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn executor(name: &str, max_attempts: usize) -> RetryExecutor {
    RetryExecutor::builder()
        .name(name)
        .max_attempts(max_attempts)
        .backoff(FixedInterval::new(Duration::from_millis(1)))
        .build()
}

#[tokio::test]
#[serial]
async fn retry_success_metrics() {
    init_recorder();

    let retry = executor("metrics_retry", 3);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let result = retry
        .execute(&CallContext::new(), |_| {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RemoteError::transient("flaky"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
    assert_eq!(result.unwrap(), "done");

    assert_counter_exists("retry_calls_total");
    assert_metric_has_label("retry_calls_total", "retry", "metrics_retry");
    assert_metric_has_label("retry_calls_total", "outcome", "success");

    assert_counter_exists("retry_attempts_total");
    assert_metric_has_label("retry_attempts_total", "retry", "metrics_retry");
}

#[tokio::test]
#[serial]
async fn retry_failure_outcomes() {
    init_recorder();

    let retry = executor("metrics_retry_fail", 2);
    let _ = retry
        .execute(&CallContext::new(), |_| async {
            Err::<(), _>(RemoteError::transient("down"))
        })
        .await;
    let _ = retry
        .execute(&CallContext::new(), |_| async {
            Err::<(), _>(RemoteError::terminal("bad input"))
        })
        .await;

    assert_metric_has_label("retry_calls_total", "outcome", "exhausted");
    assert_metric_has_label("retry_calls_total", "outcome", "terminal");
}
