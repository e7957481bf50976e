use crate::backoff::{ExponentialBackoff, IntervalFunction};
use crate::events::RetryEvent;
use crate::RetryExecutor;
use invoke_guard_core::events::{EventListeners, FnListener};
use invoke_guard_core::RemoteError;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type RetryPredicate = Arc<dyn Fn(&RemoteError) -> bool + Send + Sync>;

/// Plain retry settings.
///
/// Delay after failed attempt `n` is
/// `min(max_delay, base_delay * 2^(n-1))` jittered by `±jitter_fraction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first.
    pub max_attempts: usize,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Cap on the un-jittered delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay, `0.0..=1.0`.
    pub jitter_fraction: f64,
    /// Overall budget; a retry whose wait would end past it is not attempted.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.1,
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// The backoff this policy describes.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_delay)
            .max_delay(self.max_delay)
            .jitter(self.jitter_fraction)
    }
}

/// Configuration for a [`RetryExecutor`].
pub struct RetryConfig {
    pub(crate) name: String,
    pub(crate) max_attempts: usize,
    pub(crate) max_elapsed: Option<Duration>,
    pub(crate) interval_fn: Arc<dyn IntervalFunction>,
    pub(crate) retry_predicate: RetryPredicate,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfig {
    /// Total invocations allowed.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

/// Builder for [`RetryExecutor`].
pub struct RetryConfigBuilder {
    name: String,
    max_attempts: usize,
    max_elapsed: Option<Duration>,
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    retry_predicate: Option<RetryPredicate>,
    event_listeners: EventListeners<RetryEvent>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a builder.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - backoff: [`RetryPolicy::default`]
    /// - retries transient errors only
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_attempts: 3,
            max_elapsed: None,
            interval_fn: None,
            retry_predicate: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Applies every setting from `policy`.
    pub fn policy(self, policy: RetryPolicy) -> Self {
        let mut builder = self.max_attempts(policy.max_attempts).backoff(policy.backoff());
        builder.max_elapsed = policy.max_elapsed;
        builder
    }

    /// Sets the name used in events, logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Total invocations allowed, including the first. Values below 1 are raised to 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Stops retrying once the next wait would end past `budget` from the first attempt.
    pub fn max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    /// Sets a custom interval function.
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval_fn = Some(Arc::new(interval_fn));
        self
    }

    /// Overrides which errors are retried. By default only transient ones are.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RemoteError) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Registers a callback before each retry wait, given the failed attempt and the delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback when retries run out.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a listener for every retry event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the executor.
    pub fn build(self) -> RetryExecutor {
        let interval_fn = self
            .interval_fn
            .unwrap_or_else(|| Arc::new(RetryPolicy::default().backoff()));
        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Arc::new(|e: &RemoteError| e.is_transient()));

        RetryExecutor::from_config(RetryConfig {
            name: self.name,
            max_attempts: self.max_attempts,
            max_elapsed: self.max_elapsed,
            interval_fn,
            retry_predicate,
            event_listeners: self.event_listeners,
        })
    }
}
