use invoke_guard_circuitbreaker::CircuitState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Invoker-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokerStats {
    /// Calls answered from the cache.
    pub cache_hits: u64,
    /// Calls that looked in the cache and found nothing.
    pub cache_misses: u64,
    /// Invocations of remote-call collaborators, retries included.
    pub remote_calls: u64,
    /// Collaborator invocations that returned an error.
    pub remote_failures: u64,
    /// Calls refused by a rate limiter.
    pub rejected_by_rate_limit: u64,
    /// Calls refused by an open circuit breaker.
    pub rejected_by_breaker: u64,
}

impl InvokerStats {
    /// Hits over lookups, or 0 when nothing has been looked up.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }

    /// Failed collaborator invocations over all invocations.
    pub fn error_rate(&self) -> f64 {
        if self.remote_calls == 0 {
            0.0
        } else {
            self.remote_failures as f64 / self.remote_calls as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
    pub(crate) remote_calls: AtomicU64,
    pub(crate) remote_failures: AtomicU64,
    pub(crate) rejected_by_rate_limit: AtomicU64,
    pub(crate) rejected_by_breaker: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> InvokerStats {
        InvokerStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            rejected_by_rate_limit: self.rejected_by_rate_limit.load(Ordering::Relaxed),
            rejected_by_breaker: self.rejected_by_breaker.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.cache_hits,
            &self.cache_misses,
            &self.remote_calls,
            &self.remote_failures,
            &self.rejected_by_rate_limit,
            &self.rejected_by_breaker,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Health of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHealth {
    /// Service id.
    pub service_id: String,
    /// Breaker state.
    pub state: CircuitState,
    /// Breaker failure count.
    pub consecutive_failures: u32,
    /// Tokens left in the bucket.
    pub available_tokens: f64,
    /// `"healthy"`, `"degraded"` or `"unhealthy"`.
    pub status: &'static str,
}

impl ServiceHealth {
    /// Returns true while the breaker is closed.
    pub fn is_healthy(&self) -> bool {
        self.state == CircuitState::Closed
    }
}

/// Health of every registered service, sorted by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthReport {
    /// One entry per service.
    pub services: Vec<ServiceHealth>,
}

impl HealthReport {
    /// Returns true if every service is healthy.
    pub fn is_healthy(&self) -> bool {
        self.services.iter().all(ServiceHealth::is_healthy)
    }

    /// Looks up one service.
    pub fn service(&self, id: &str) -> Option<&ServiceHealth> {
        self.services.iter().find(|s| s.service_id == id)
    }

    /// Ids of services that are not healthy.
    pub fn unhealthy(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|s| !s.is_healthy())
            .map(|s| s.service_id.as_str())
    }
}
