use invoke_guard_circuitbreaker::Rejected;
use invoke_guard_core::{Cancelled, RemoteError};
use invoke_guard_ratelimiter::RateLimiterError;
use invoke_guard_retry::RetryError;
use std::time::Duration;

/// Errors returned by [`Invoker`](crate::Invoker).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    /// The remote call failed in a way retrying will not fix.
    #[error("remote call failed: {0}")]
    Terminal(RemoteError),

    /// A transient failure that was not retried.
    #[error("remote call failed: {0}")]
    Transient(RemoteError),

    /// The service's rate limiter refused the call.
    #[error("rate limit exceeded for service '{service}'")]
    RateLimitExceeded {
        /// Service id.
        service: String,
        /// Projected wait until tokens are available, when known.
        retry_after: Option<Duration>,
    },

    /// The service's circuit breaker is open.
    #[error("service '{service}' is unavailable")]
    ServiceUnavailable {
        /// Service id.
        service: String,
        /// Time until the breaker admits a trial call, when known.
        retry_after: Option<Duration>,
    },

    /// Every permitted attempt failed transiently.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: usize,
        /// The final attempt's error.
        last: RemoteError,
    },

    /// The caller cancelled the call or its deadline passed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// No service is registered under this id.
    #[error("unknown service '{0}'")]
    UnknownService(String),
}

impl InvokeError {
    /// Returns true if the same call might succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InvokeError::Transient(_)
                | InvokeError::RateLimitExceeded { .. }
                | InvokeError::ServiceUnavailable { .. }
                | InvokeError::RetriesExhausted { .. }
        )
    }

    /// Returns true if the call was refused before reaching the remote service.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            InvokeError::RateLimitExceeded { .. } | InvokeError::ServiceUnavailable { .. }
        )
    }

    /// Returns true for rate-limit rejections.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, InvokeError::RateLimitExceeded { .. })
    }

    /// Returns true for circuit-breaker rejections.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, InvokeError::ServiceUnavailable { .. })
    }

    /// Returns true if the call was cancelled or timed out.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InvokeError::Cancelled(_))
    }

    /// Suggested wait before trying again, for rejections that know it.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            InvokeError::RateLimitExceeded { retry_after, .. }
            | InvokeError::ServiceUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The remote error behind this failure, if any.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            InvokeError::Terminal(e) | InvokeError::Transient(e) => Some(e),
            InvokeError::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Short label used in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            InvokeError::Terminal(_) => "terminal",
            InvokeError::Transient(_) => "transient",
            InvokeError::RateLimitExceeded { .. } => "rate_limited",
            InvokeError::ServiceUnavailable { .. } => "unavailable",
            InvokeError::RetriesExhausted { .. } => "exhausted",
            InvokeError::Cancelled(_) => "cancelled",
            InvokeError::UnknownService(_) => "unknown_service",
        }
    }
}

impl From<RateLimiterError> for InvokeError {
    fn from(err: RateLimiterError) -> Self {
        match err {
            RateLimiterError::RateLimitExceeded { name, retry_after } => {
                InvokeError::RateLimitExceeded {
                    service: name,
                    retry_after,
                }
            }
            RateLimiterError::InsufficientCapacity { name, .. } => {
                InvokeError::RateLimitExceeded {
                    service: name,
                    retry_after: None,
                }
            }
            RateLimiterError::Cancelled(c) => InvokeError::Cancelled(c),
        }
    }
}

impl From<Rejected> for InvokeError {
    fn from(err: Rejected) -> Self {
        InvokeError::ServiceUnavailable {
            service: err.name,
            retry_after: err.retry_after,
        }
    }
}

impl From<RetryError> for InvokeError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Terminal { source, .. } if source.is_transient() => {
                InvokeError::Transient(source)
            }
            RetryError::Terminal { source, .. } => InvokeError::Terminal(source),
            RetryError::RetriesExhausted { attempts, last } => {
                InvokeError::RetriesExhausted { attempts, last }
            }
            RetryError::Cancelled(c) => InvokeError::Cancelled(c),
        }
    }
}
