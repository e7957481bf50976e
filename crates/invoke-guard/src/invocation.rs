use invoke_guard_ratelimiter::AcquireMode;
use serde_json::Value;
use std::time::Duration;

/// A single call routed through the [`Invoker`](crate::Invoker).
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Which registered service to call.
    pub service_id: String,
    /// Operation name; part of the cache fingerprint.
    pub operation: String,
    /// Operation parameters; part of the cache fingerprint.
    pub parameters: Value,
    /// Rate-limit behavior for this call. `None` uses the service default.
    pub admission: Option<AcquireMode>,
    /// Cache TTL for this call's result. `None` uses the service's TTL policy.
    pub ttl: Option<Duration>,
    /// Skip the cache lookup. A successful result is still stored.
    pub bypass_cache: bool,
    /// Tokens this call takes from the bucket.
    pub cost: u32,
}

impl Invocation {
    /// A call with default admission, TTL and cost.
    pub fn new(service_id: impl Into<String>, operation: impl Into<String>, parameters: Value) -> Self {
        Self {
            service_id: service_id.into(),
            operation: operation.into(),
            parameters,
            admission: None,
            ttl: None,
            bypass_cache: false,
            cost: 1,
        }
    }

    /// Overrides the rate-limit behavior.
    pub fn admission(mut self, mode: AcquireMode) -> Self {
        self.admission = Some(mode);
        self
    }

    /// Overrides the cache TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Forces a fresh remote call.
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Sets the token cost.
    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }
}
