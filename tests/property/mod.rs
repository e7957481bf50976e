//! Invariants checked here:
//! - cache.rs: fingerprints ignore key order; entries are visible exactly while unexpired
//! - circuit_breaker.rs: the breaker matches a consecutive-failure model
//! - rate_limiter.rs: admissions never exceed capacity plus refill
//! - retry.rs: attempt counts and delays stay within the configured policy

pub mod cache;
pub mod rate_limiter;
pub mod retry;

pub(crate) fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}
