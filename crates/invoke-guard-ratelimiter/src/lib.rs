//! Token-bucket rate limiter.
//!
//! The bucket holds up to `capacity` tokens and accrues `refill_per_second`
//! tokens continuously. Refill is computed from elapsed time whenever the
//! bucket is touched; there is no background task.
//!
//! Two admission modes:
//! - [`AcquireMode::FailFast`] rejects immediately when tokens are short.
//! - [`AcquireMode::Block`] suspends the caller until tokens accrue. If the
//!   projected wait exceeds the optional timeout the call is rejected
//!   straight away rather than after waiting.
//!
//! Check-and-take happens under one lock, so two callers racing for the last
//! token never both succeed. The lock is never held while waiting.
//!
//! ```rust
//! use invoke_guard_core::CallContext;
//! use invoke_guard_ratelimiter::{AcquireMode, RateLimiter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = RateLimiter::builder().name("llm").capacity(2).refill_per_second(1.0).build();
//! let ctx = CallContext::new();
//!
//! limiter.acquire(1, AcquireMode::FailFast, &ctx).await.unwrap();
//! limiter.acquire(1, AcquireMode::FailFast, &ctx).await.unwrap();
//! assert!(limiter.acquire(1, AcquireMode::FailFast, &ctx).await.is_err());
//! # }
//! ```

mod bucket;
mod config;
mod error;
mod events;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;

use bucket::TokenBucket;
use invoke_guard_core::CallContext;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

/// How to behave when tokens are short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireMode {
    /// Reject immediately.
    #[default]
    FailFast,
    /// Wait for tokens, giving up if the wait would exceed `timeout`.
    Block {
        /// Longest acceptable wait. `None` waits as long as needed.
        timeout: Option<Duration>,
    },
}

impl AcquireMode {
    /// Blocking without a timeout.
    pub const fn block() -> Self {
        AcquireMode::Block { timeout: None }
    }

    /// Blocking for at most `timeout`.
    pub const fn block_for(timeout: Duration) -> Self {
        AcquireMode::Block {
            timeout: Some(timeout),
        }
    }
}

struct Shared {
    config: RateLimiterConfig,
    bucket: Mutex<TokenBucket>,
}

/// A token-bucket rate limiter for one remote service.
///
/// Clones share the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.shared.config.name)
            .field("capacity", &self.shared.config.capacity)
            .field("available", &self.available_tokens())
            .finish()
    }
}

impl RateLimiter {
    /// Starts building a limiter.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    pub(crate) fn from_config(config: RateLimiterConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "ratelimiter_calls_total",
                "Total number of rate limiter decisions (permitted or rejected)"
            );
            describe_histogram!(
                "ratelimiter_wait_duration_seconds",
                "Time spent waiting for tokens"
            );
        }

        let bucket = TokenBucket::new(config.capacity, config.refill_per_second);
        Self {
            shared: Arc::new(Shared {
                config,
                bucket: Mutex::new(bucket),
            }),
        }
    }

    /// The limiter's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.shared.config
    }

    fn bucket(&self) -> MutexGuard<'_, TokenBucket> {
        self.shared
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquires using the configured default mode.
    pub async fn acquire_default(
        &self,
        cost: u32,
        ctx: &CallContext,
    ) -> Result<Duration, RateLimiterError> {
        self.acquire(cost, self.shared.config.default_mode, ctx).await
    }

    /// Takes `cost` tokens, waiting if `mode` allows.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(
        &self,
        cost: u32,
        mode: AcquireMode,
        ctx: &CallContext,
    ) -> Result<Duration, RateLimiterError> {
        let capacity = self.shared.config.capacity;
        if cost > capacity {
            self.rejected(cost, None);
            return Err(RateLimiterError::InsufficientCapacity {
                name: self.shared.config.name.clone(),
                cost,
                capacity,
            });
        }

        let start = Instant::now();
        let give_up_at = match mode {
            AcquireMode::Block {
                timeout: Some(timeout),
            } => start.checked_add(timeout),
            _ => None,
        };

        loop {
            let now = Instant::now();
            let attempt = self.bucket().try_take(cost, now);

            let wait = match attempt {
                Ok(()) => {
                    let waited = now.saturating_duration_since(start);
                    self.acquired(cost, waited);
                    return Ok(waited);
                }
                Err(None) => {
                    self.rejected(cost, None);
                    return Err(self.exceeded(None));
                }
                Err(Some(wait)) => wait,
            };

            match mode {
                AcquireMode::FailFast => {
                    self.rejected(cost, Some(wait));
                    return Err(self.exceeded(Some(wait)));
                }
                AcquireMode::Block { .. } => {
                    if let Some(limit) = give_up_at {
                        if now.checked_add(wait).map_or(true, |ready| ready > limit) {
                            self.rejected(cost, Some(wait));
                            return Err(self.exceeded(Some(wait)));
                        }
                    }
                    tracing::debug!(
                        limiter = %self.name(),
                        cost,
                        wait_ms = wait.as_millis() as u64,
                        "waiting for tokens"
                    );
                    ctx.sleep(wait).await?;
                }
            }
        }
    }

    /// Tokens currently available.
    pub fn available_tokens(&self) -> f64 {
        self.bucket().available(Instant::now())
    }

    /// Refills the bucket to capacity.
    pub fn reset(&self) {
        self.bucket().fill(Instant::now());
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> u32 {
        self.bucket().capacity()
    }

    fn exceeded(&self, retry_after: Option<Duration>) -> RateLimiterError {
        RateLimiterError::RateLimitExceeded {
            name: self.shared.config.name.clone(),
            retry_after,
        }
    }

    fn acquired(&self, cost: u32, wait_duration: Duration) {
        self.shared
            .config
            .event_listeners
            .emit(&RateLimiterEvent::PermitAcquired {
                pattern_name: self.shared.config.name.clone(),
                timestamp: std::time::Instant::now(),
                cost,
                wait_duration,
            });

        #[cfg(feature = "metrics")]
        {
            counter!("ratelimiter_calls_total", "ratelimiter" => self.shared.config.name.clone(), "result" => "permitted").increment(1);
            histogram!("ratelimiter_wait_duration_seconds", "ratelimiter" => self.shared.config.name.clone())
                .record(wait_duration.as_secs_f64());
        }
    }

    fn rejected(&self, cost: u32, retry_after: Option<Duration>) {
        tracing::debug!(limiter = %self.name(), cost, ?retry_after, "rate limit exceeded");
        self.shared
            .config
            .event_listeners
            .emit(&RateLimiterEvent::PermitRejected {
                pattern_name: self.shared.config.name.clone(),
                timestamp: std::time::Instant::now(),
                cost,
                retry_after,
            });

        #[cfg(feature = "metrics")]
        counter!("ratelimiter_calls_total", "ratelimiter" => self.shared.config.name.clone(), "result" => "rejected").increment(1);
    }
}
