//! Facade tests, grouped by concern.
//!
//! - breaker_flow.rs: breaker trips, rejects without remote calls, half-open trial
//! - cache_ttl.rs: TTL windows, overrides, wall-clock expiry
//! - ordering.rs: the fixed order of cache, limiter, breaker and retry
//! - cancellation.rs: token and deadline aborts at every suspension point
//! - batch.rs: bounded parallelism and result order
//! - config.rs: building an invoker from JSON, env overlay, persistence

mod batch;
mod breaker_flow;
mod cancellation;
mod config;
mod ordering;
