use invoke_guard::{CallContext, RemoteError, RetryExecutor, RetryPolicy};
use invoke_guard_retry::ExponentialBackoff;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: a persistently transient operation runs exactly max_attempts times,
    /// and every delay lies within the jittered, capped bound
    #[test]
    fn attempts_and_delays_follow_policy(
        max_attempts in 1usize..8,
        base_ms in 1u64..500,
        cap_factor in 1u64..20,
        jitter in 0.0f64..=0.5,
    ) {
        let rt = super::paused_runtime();
        rt.block_on(async {
            let policy = RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(base_ms * cap_factor),
                jitter_fraction: jitter,
                max_elapsed: None,
            };
            let delays = Arc::new(Mutex::new(Vec::new()));
            let d = Arc::clone(&delays);
            let retry = RetryExecutor::builder()
                .policy(policy)
                .on_retry(move |attempt, delay| d.lock().unwrap().push((attempt, delay)))
                .build();

            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);
            let result = retry
                .execute(&CallContext::new(), |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(RemoteError::transient("down")) }
                })
                .await;

            prop_assert!(result.is_err());
            prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);

            let backoff: ExponentialBackoff = policy.backoff();
            let delays = delays.lock().unwrap();
            prop_assert_eq!(delays.len(), max_attempts - 1);
            for (attempt, delay) in delays.iter() {
                let (low, high) = backoff.delay_bounds(*attempt);
                prop_assert!(*delay >= low && *delay <= high);
                let nominal = backoff.nominal(*attempt);
                prop_assert!(nominal <= policy.max_delay);
            }
            Ok(())
        })?;
    }

    /// Property: terminal errors are never retried
    #[test]
    fn terminal_errors_run_once(max_attempts in 1usize..10, status in 400u16..429) {
        prop_assume!(status != 408 && status != 425);
        let rt = super::paused_runtime();
        rt.block_on(async {
            let retry = RetryExecutor::builder().max_attempts(max_attempts).build();
            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);
            let _ = retry
                .execute(&CallContext::new(), |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    async move { Err::<(), _>(RemoteError::from_status(status, "bad request")) }
                })
                .await;
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            Ok(())
        })?;
    }
}
