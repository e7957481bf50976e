use invoke_guard_core::events::GuardEvent;
use std::time::{Duration, Instant};

/// Events emitted by the rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// Tokens were granted, possibly after waiting.
    PermitAcquired {
        pattern_name: String,
        timestamp: Instant,
        cost: u32,
        wait_duration: Duration,
    },
    /// The request was refused.
    PermitRejected {
        pattern_name: String,
        timestamp: Instant,
        cost: u32,
        retry_after: Option<Duration>,
    },
}

impl GuardEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::PermitRejected { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { pattern_name, .. }
            | RateLimiterEvent::PermitRejected { pattern_name, .. } => pattern_name,
        }
    }
}
