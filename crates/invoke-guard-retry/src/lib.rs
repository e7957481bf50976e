//! Retry executor with capped, jittered exponential backoff.
//!
//! The executor runs an operation that reports classified [`RemoteError`]s.
//! Terminal errors stop the loop at once. Transient errors are retried after
//! a backoff wait until `max_attempts` invocations have been made (or the
//! optional elapsed budget would be overrun), at which point the last error
//! is returned as [`RetryError::RetriesExhausted`].
//!
//! Each attempt and each wait runs under the caller's [`CallContext`]:
//! cancelling it, or passing its deadline, ends the loop with
//! [`RetryError::Cancelled`].
//!
//! ```rust
//! use invoke_guard_core::{CallContext, RemoteError};
//! use invoke_guard_retry::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let retry = RetryExecutor::builder()
//!     .name("llm")
//!     .policy(RetryPolicy {
//!         max_attempts: 3,
//!         base_delay: Duration::from_millis(1),
//!         max_delay: Duration::from_millis(10),
//!         jitter_fraction: 0.0,
//!         max_elapsed: None,
//!     })
//!     .build();
//!
//! let out = retry
//!     .execute(&CallContext::new(), |attempt| async move {
//!         if attempt < 3 {
//!             Err(RemoteError::transient("busy"))
//!         } else {
//!             Ok(attempt)
//!         }
//!     })
//!     .await;
//! assert_eq!(out.unwrap(), 3);
//! # }
//! ```

mod backoff;
mod config;
mod error;
mod events;

pub use backoff::{ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction};
pub use config::{RetryConfig, RetryConfigBuilder, RetryPolicy};
pub use error::RetryError;
pub use events::RetryEvent;

use invoke_guard_core::{CallContext, RemoteError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

/// Runs operations with retries.
///
/// Clones share configuration.
#[derive(Clone)]
pub struct RetryExecutor {
    config: Arc<RetryConfig>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("name", &self.config.name)
            .field("max_attempts", &self.config.max_attempts)
            .finish()
    }
}

impl RetryExecutor {
    /// Starts building an executor.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub(crate) fn from_config(config: RetryConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "retry_calls_total",
                "Total number of operations run through the retry executor"
            );
            describe_counter!("retry_attempts_total", "Total number of retry attempts");
        }

        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration this executor was built with.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        ctx: &CallContext,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match ctx.run(operation(attempt)).await? {
                Ok(value) => {
                    self.emit(RetryEvent::Success {
                        pattern_name: self.config.name.clone(),
                        timestamp: std::time::Instant::now(),
                        attempts: attempt,
                    });
                    #[cfg(feature = "metrics")]
                    counter!("retry_calls_total", "retry" => self.config.name.clone(), "outcome" => "success").increment(1);
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !(self.config.retry_predicate)(&error) {
                tracing::debug!(retry = %self.config.name, attempt, %error, "non-retryable failure");
                self.emit(RetryEvent::TerminalError {
                    pattern_name: self.config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    attempts: attempt,
                });
                #[cfg(feature = "metrics")]
                counter!("retry_calls_total", "retry" => self.config.name.clone(), "outcome" => "terminal").increment(1);
                return Err(RetryError::Terminal {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.config.interval_fn.next_interval(attempt);
            if attempt >= self.config.max_attempts || self.over_budget(start, delay) {
                return Err(self.exhausted(attempt, error));
            }

            tracing::debug!(
                retry = %self.config.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "transient failure, retrying"
            );
            self.emit(RetryEvent::Retry {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                attempt,
                delay,
            });
            #[cfg(feature = "metrics")]
            counter!("retry_attempts_total", "retry" => self.config.name.clone()).increment(1);

            ctx.sleep(delay).await?;
        }
    }

    fn over_budget(&self, start: Instant, delay: Duration) -> bool {
        match self.config.max_elapsed {
            Some(budget) => start
                .elapsed()
                .checked_add(delay)
                .map_or(true, |total| total > budget),
            None => false,
        }
    }

    fn exhausted(&self, attempts: usize, last: RemoteError) -> RetryError {
        tracing::warn!(retry = %self.config.name, attempts, error = %last, "retries exhausted");
        self.emit(RetryEvent::Exhausted {
            pattern_name: self.config.name.clone(),
            timestamp: std::time::Instant::now(),
            attempts,
        });
        #[cfg(feature = "metrics")]
        counter!("retry_calls_total", "retry" => self.config.name.clone(), "outcome" => "exhausted").increment(1);
        RetryError::RetriesExhausted { attempts, last }
    }

    fn emit(&self, event: RetryEvent) {
        self.config.event_listeners.emit(&event);
    }
}
