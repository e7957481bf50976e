use invoke_guard_core::events::GuardEvent;
use std::time::{Duration, Instant};

/// Events emitted once per facade call.
#[derive(Debug, Clone)]
pub enum InvokeEvent {
    /// Answered from the cache.
    CacheHit {
        service_id: String,
        operation: String,
        timestamp: Instant,
    },
    /// The remote service answered.
    Completed {
        service_id: String,
        operation: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The call failed; `outcome` is [`InvokeError::outcome`](crate::InvokeError::outcome).
    Failed {
        service_id: String,
        operation: String,
        timestamp: Instant,
        duration: Duration,
        outcome: &'static str,
    },
}

impl GuardEvent for InvokeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvokeEvent::CacheHit { .. } => "cache_hit",
            InvokeEvent::Completed { .. } => "completed",
            InvokeEvent::Failed { .. } => "failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            InvokeEvent::CacheHit { timestamp, .. }
            | InvokeEvent::Completed { timestamp, .. }
            | InvokeEvent::Failed { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            InvokeEvent::CacheHit { service_id, .. }
            | InvokeEvent::Completed { service_id, .. }
            | InvokeEvent::Failed { service_id, .. } => service_id,
        }
    }
}
