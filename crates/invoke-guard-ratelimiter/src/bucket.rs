use std::time::Duration;
use tokio::time::Instant;

// absorbs float error so a wait computed from the deficit always suffices
const EPSILON: f64 = 1e-9;

/// Token bucket refilled on access.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub(crate) fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate: if refill_rate.is_finite() && refill_rate > 0.0 {
                refill_rate
            } else {
                0.0
            },
            last_refill: Instant::now(),
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Takes `cost` tokens if available.
    ///
    /// On shortfall returns the time until enough tokens will have accrued,
    /// or `None` if they never will.
    pub(crate) fn try_take(&mut self, cost: u32, now: Instant) -> Result<(), Option<Duration>> {
        self.refill(now);
        let cost = cost as f64;
        if self.tokens + EPSILON >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            return Ok(());
        }
        if self.refill_rate == 0.0 {
            return Err(None);
        }
        let deficit = cost - self.tokens;
        Err(Duration::try_from_secs_f64(deficit / self.refill_rate).ok())
    }

    /// Tokens available at `now`.
    pub(crate) fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Refills to capacity.
    pub(crate) fn fill(&mut self, now: Instant) {
        self.tokens = self.capacity as f64;
        self.last_refill = now;
    }
}
