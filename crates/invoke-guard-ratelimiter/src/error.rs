use invoke_guard_core::Cancelled;
use std::time::Duration;

/// Errors returned by [`RateLimiter::acquire`](crate::RateLimiter::acquire).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimiterError {
    /// Not enough tokens, and waiting was not allowed or would take too long.
    #[error("rate limit exceeded for '{name}'")]
    RateLimitExceeded {
        /// Name of the limiter.
        name: String,
        /// Projected wait until enough tokens accrue. `None` when they never will.
        retry_after: Option<Duration>,
    },

    /// The request costs more than the bucket can ever hold.
    #[error("cost {cost} exceeds capacity {capacity} of '{name}'")]
    InsufficientCapacity {
        /// Name of the limiter.
        name: String,
        /// Tokens requested.
        cost: u32,
        /// Bucket capacity.
        capacity: u32,
    },

    /// The caller cancelled while waiting.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl RateLimiterError {
    /// The projected wait, for rejections that know it.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimiterError::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
