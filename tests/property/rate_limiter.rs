use invoke_guard::{AcquireMode, CallContext, RateLimiter};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: without refill, exactly min(capacity, requests) are admitted
    #[test]
    fn never_exceeds_capacity(capacity in 1u32..50, requests in 1u32..200) {
        let rt = super::paused_runtime();
        rt.block_on(async {
            let limiter = RateLimiter::builder()
                .capacity(capacity)
                .refill_per_second(0.0)
                .build();
            let ctx = CallContext::new();

            let mut admitted = 0;
            for _ in 0..requests {
                if limiter.acquire(1, AcquireMode::FailFast, &ctx).await.is_ok() {
                    admitted += 1;
                }
            }
            prop_assert_eq!(admitted, capacity.min(requests));
            Ok(())
        })?;
    }

    /// Property: over any span, admissions stay within capacity plus what refilled
    #[test]
    fn admissions_bounded_by_refill(
        capacity in 1u32..20,
        rate in 0.5f64..20.0,
        steps in prop::collection::vec(0u64..500, 1..60),
    ) {
        let rt = super::paused_runtime();
        rt.block_on(async {
            let limiter = RateLimiter::builder()
                .capacity(capacity)
                .refill_per_second(rate)
                .build();
            let ctx = CallContext::new();
            let start = tokio::time::Instant::now();

            let mut admitted = 0u32;
            for step_ms in steps {
                tokio::time::advance(Duration::from_millis(step_ms)).await;
                if limiter.acquire(1, AcquireMode::FailFast, &ctx).await.is_ok() {
                    admitted += 1;
                }
                let refilled = start.elapsed().as_secs_f64() * rate;
                prop_assert!(
                    f64::from(admitted) <= f64::from(capacity) + refilled + 1e-6,
                    "admitted {} with capacity {} and {:.3} refilled",
                    admitted,
                    capacity,
                    refilled
                );
                let tokens = limiter.available_tokens();
                prop_assert!((0.0..=f64::from(capacity)).contains(&tokens));
            }
            Ok(())
        })?;
    }
}
