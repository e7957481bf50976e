use invoke_guard_core::events::GuardEvent;
use std::time::{Duration, Instant};

/// Events emitted by the retry executor.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt failed transiently and another will follow after `delay`.
    Retry {
        pattern_name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded (either on first try or after retries).
    Success {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Attempts or the elapsed budget ran out.
    Exhausted {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// An attempt failed with an error that is not retried.
    TerminalError {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
}

impl GuardEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::TerminalError { .. } => "terminal_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::TerminalError { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RetryEvent::Retry { pattern_name, .. }
            | RetryEvent::Success { pattern_name, .. }
            | RetryEvent::Exhausted { pattern_name, .. }
            | RetryEvent::TerminalError { pattern_name, .. } => pattern_name,
        }
    }
}
