use super::helpers::*;
use invoke_guard::CircuitBreaker;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn circuitbreaker_call_and_transition_metrics() {
    init_recorder();

    let breaker = CircuitBreaker::builder()
        .name("metrics_breaker")
        .failure_threshold(2)
        .open_timeout(Duration::from_secs(60))
        .build();

    breaker.allow_request().unwrap().record_success();
    breaker.allow_request().unwrap().record_failure();
    breaker.allow_request().unwrap().record_failure();
    assert!(breaker.allow_request().is_err());

    assert_counter_exists("circuitbreaker_calls_total");
    assert_metric_has_label("circuitbreaker_calls_total", "circuitbreaker", "metrics_breaker");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "success");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "failure");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "rejected");

    assert_counter_exists("circuitbreaker_transitions_total");
    assert_metric_has_label("circuitbreaker_transitions_total", "from", "Closed");
    assert_metric_has_label("circuitbreaker_transitions_total", "to", "Open");

    assert_gauge_exists("circuitbreaker_state");
    assert_metric_has_label("circuitbreaker_state", "circuitbreaker", "metrics_breaker");
}
