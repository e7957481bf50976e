use crate::events::RateLimiterEvent;
use crate::{AcquireMode, RateLimiter};
use invoke_guard_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`RateLimiter`].
pub struct RateLimiterConfig {
    pub(crate) name: String,
    pub(crate) capacity: u32,
    pub(crate) refill_per_second: f64,
    pub(crate) default_mode: AcquireMode,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
}

impl RateLimiterConfig {
    /// Bucket capacity in tokens.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Mode used by [`RateLimiter::acquire_default`].
    pub fn default_mode(&self) -> AcquireMode {
        self.default_mode
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterConfigBuilder {
    name: String,
    capacity: u32,
    refill_per_second: f64,
    default_mode: AcquireMode,
    event_listeners: EventListeners<RateLimiterEvent>,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a builder.
    ///
    /// Defaults:
    /// - capacity: 100 tokens
    /// - refill: 100 tokens per hour
    /// - mode: fail fast
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            capacity: 100,
            refill_per_second: 100.0 / 3600.0,
            default_mode: AcquireMode::FailFast,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name used in events, logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Maximum tokens the bucket holds. The bucket starts full.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Tokens added per second. Zero, negative and non-finite values mean no refill.
    pub fn refill_per_second(mut self, rate: f64) -> Self {
        self.refill_per_second = rate;
        self
    }

    /// Convenience for "`permits` per `period`".
    pub fn limit_for_period(self, permits: u32, period: Duration) -> Self {
        let secs = period.as_secs_f64();
        let rate = if secs > 0.0 { permits as f64 / secs } else { 0.0 };
        self.capacity(permits).refill_per_second(rate)
    }

    /// Mode used when the caller does not choose one.
    pub fn default_mode(mut self, mode: AcquireMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Registers a callback for granted permits, given the time spent waiting.
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::PermitAcquired { wait_duration, .. } = event {
                f(*wait_duration);
            }
        }));
        self
    }

    /// Registers a callback for rejected requests.
    pub fn on_permit_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<Duration>) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::PermitRejected { retry_after, .. } = event {
                f(*retry_after);
            }
        }));
        self
    }

    /// Builds the limiter.
    pub fn build(self) -> RateLimiter {
        RateLimiter::from_config(RateLimiterConfig {
            name: self.name,
            capacity: self.capacity,
            refill_per_second: self.refill_per_second,
            default_mode: self.default_mode,
            event_listeners: self.event_listeners,
        })
    }
}
