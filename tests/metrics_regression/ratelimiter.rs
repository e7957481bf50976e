use super::helpers::*;
use invoke_guard::{AcquireMode, CallContext, RateLimiter};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn ratelimiter_metrics() {
    init_recorder();

    let limiter = RateLimiter::builder()
        .name("metrics_limiter")
        .capacity(1)
        .refill_per_second(0.001)
        .build();
    let ctx = CallContext::new();

    assert!(limiter.acquire(1, AcquireMode::FailFast, &ctx).await.is_ok());
    assert!(limiter.acquire(1, AcquireMode::FailFast, &ctx).await.is_err());

    assert_counter_exists("ratelimiter_calls_total");
    assert_metric_has_label("ratelimiter_calls_total", "ratelimiter", "metrics_limiter");
    assert_metric_has_label("ratelimiter_calls_total", "result", "permitted");
    assert_metric_has_label("ratelimiter_calls_total", "result", "rejected");

    assert_histogram_exists("ratelimiter_wait_duration_seconds");
    assert_metric_has_label("ratelimiter_wait_duration_seconds", "ratelimiter", "metrics_limiter");
}
