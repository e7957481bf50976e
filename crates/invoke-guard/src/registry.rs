//! Per-service resilience state.
//!
//! Each registered service owns its own rate limiter, circuit breaker,
//! retry executor and remote-call collaborator. The registry is built once
//! and handed to the [`Invoker`](crate::Invoker); nothing here is global.

use crate::config::{ConfigError, ServiceConfig};
use crate::remote::RemoteCall;
use invoke_guard_circuitbreaker::CircuitBreaker;
use invoke_guard_ratelimiter::RateLimiter;
use invoke_guard_retry::RetryExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything the invoker needs to call one service.
pub struct ServiceEntry {
    id: String,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryExecutor,
    remote: Arc<dyn RemoteCall>,
    default_ttl: Duration,
    ttl_overrides: HashMap<String, Duration>,
}

impl std::fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("id", &self.id)
            .field("limiter", &self.limiter)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl ServiceEntry {
    /// Starts an entry with hand-built components.
    ///
    /// Components default to the values in [`ServiceConfig::default`].
    pub fn builder(id: impl Into<String>, remote: Arc<dyn RemoteCall>) -> ServiceEntryBuilder {
        ServiceEntryBuilder {
            id: id.into(),
            remote,
            limiter: None,
            breaker: None,
            retry: None,
            default_ttl: Duration::from_secs(ServiceConfig::default().cache_ttl_seconds),
            ttl_overrides: HashMap::new(),
        }
    }

    /// Builds every component from a flat config, naming each after `id`.
    pub fn from_config(
        id: impl Into<String>,
        config: &ServiceConfig,
        remote: Arc<dyn RemoteCall>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let id = id.into();

        let limiter = RateLimiter::builder()
            .name(id.clone())
            .capacity(config.rate_limit_capacity)
            .refill_per_second(config.rate_limit_refill_per_second)
            .default_mode(config.acquire_mode())
            .build();

        let breaker = CircuitBreaker::builder()
            .name(id.clone())
            .failure_threshold(config.breaker_failure_threshold)
            .open_timeout(config.open_timeout())
            .build();

        let retry = RetryExecutor::builder()
            .name(id.clone())
            .policy(config.retry_policy())
            .build();

        let ttl_overrides = config
            .cache_ttl_overrides
            .iter()
            .map(|(op, secs)| (op.clone(), Duration::from_secs(*secs)))
            .collect();

        Ok(Self {
            id,
            limiter,
            breaker,
            retry,
            remote,
            default_ttl: Duration::from_secs(config.cache_ttl_seconds),
            ttl_overrides,
        })
    }

    /// The service id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The service's rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The service's circuit breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The service's retry executor.
    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteCall> {
        &self.remote
    }

    /// Cache TTL for `operation`.
    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.ttl_overrides
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Builder for [`ServiceEntry`].
pub struct ServiceEntryBuilder {
    id: String,
    remote: Arc<dyn RemoteCall>,
    limiter: Option<RateLimiter>,
    breaker: Option<CircuitBreaker>,
    retry: Option<RetryExecutor>,
    default_ttl: Duration,
    ttl_overrides: HashMap<String, Duration>,
}

impl ServiceEntryBuilder {
    /// Uses `limiter` for this service.
    pub fn limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Uses `breaker` for this service.
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Uses `retry` for this service.
    pub fn retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Default cache TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Cache TTL for one operation.
    pub fn ttl_for(mut self, operation: impl Into<String>, ttl: Duration) -> Self {
        self.ttl_overrides.insert(operation.into(), ttl);
        self
    }

    /// Builds the entry, filling missing components from defaults.
    pub fn build(self) -> ServiceEntry {
        let defaults = ServiceConfig::default();
        let id = self.id;
        ServiceEntry {
            limiter: self.limiter.unwrap_or_else(|| {
                RateLimiter::builder()
                    .name(id.clone())
                    .capacity(defaults.rate_limit_capacity)
                    .refill_per_second(defaults.rate_limit_refill_per_second)
                    .build()
            }),
            breaker: self.breaker.unwrap_or_else(|| {
                CircuitBreaker::builder()
                    .name(id.clone())
                    .failure_threshold(defaults.breaker_failure_threshold)
                    .open_timeout(defaults.open_timeout())
                    .build()
            }),
            retry: self.retry.unwrap_or_else(|| {
                RetryExecutor::builder()
                    .name(id.clone())
                    .policy(defaults.retry_policy())
                    .build()
            }),
            id,
            remote: self.remote,
            default_ttl: self.default_ttl,
            ttl_overrides: self.ttl_overrides,
        }
    }
}

/// Services known to an invoker, keyed by id.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<ServiceEntry>>,
}

impl ServiceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service built from `config`.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        config: &ServiceConfig,
        remote: Arc<dyn RemoteCall>,
    ) -> Result<&mut Self, ConfigError> {
        let entry = ServiceEntry::from_config(id, config, remote)?;
        self.insert(entry)
    }

    /// Registers a pre-built entry.
    pub fn insert(&mut self, entry: ServiceEntry) -> Result<&mut Self, ConfigError> {
        if self.services.contains_key(entry.id()) {
            return Err(ConfigError::DuplicateService(entry.id));
        }
        tracing::debug!(service = %entry.id, "registered service");
        self.services.insert(entry.id.clone(), Arc::new(entry));
        Ok(self)
    }

    /// Looks up a service.
    pub fn get(&self, id: &str) -> Option<&Arc<ServiceEntry>> {
        self.services.get(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.services.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
