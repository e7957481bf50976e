use rand::Rng;
use std::time::Duration;

/// Computes the wait before the next attempt.
pub trait IntervalFunction: Send + Sync {
    /// Delay after attempt number `attempt` (1-based) failed.
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// Same delay every time.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a fixed backoff.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.duration
    }
}

/// `min(max_delay, base_delay * multiplier^(attempt-1))`, then jittered by
/// up to `±jitter` of that value.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Doubling backoff from `base_delay`, capped at 60 seconds, no jitter.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }

    /// Sets the growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    /// Caps the un-jittered delay.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`.
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// The capped delay before jitter.
    pub fn nominal(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(1023) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let uncapped = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        uncapped.min(self.max_delay)
    }

    /// Inclusive range the jittered delay for `attempt` falls in.
    pub fn delay_bounds(&self, attempt: usize) -> (Duration, Duration) {
        let nominal = self.nominal(attempt);
        let spread = nominal.as_secs_f64() * self.jitter;
        let low = (nominal.as_secs_f64() - spread).max(0.0);
        let high = nominal.as_secs_f64() + spread;
        (
            Duration::from_secs_f64(low),
            Duration::try_from_secs_f64(high).unwrap_or(Duration::MAX),
        )
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        if self.jitter == 0.0 {
            return self.nominal(attempt);
        }
        let (low, high) = self.delay_bounds(attempt);
        let secs = rand::rng().random_range(low.as_secs_f64()..=high.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(high)
    }
}

/// Closure-backed interval.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Wraps a closure receiving the 1-based failed attempt number.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}
