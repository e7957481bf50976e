//! Resilient invocation facade.
//!
//! [`Invoker`] routes every outbound call to a remote service through four
//! guards, always in the same order:
//!
//! 1. the request is fingerprinted and looked up in the shared [`Cache`];
//!    a hit is returned at once and touches nothing else,
//! 2. the service's [`RateLimiter`] admits the call, waits, or refuses it,
//! 3. the service's [`CircuitBreaker`] admits the call or fails it with
//!    [`InvokeError::ServiceUnavailable`] without contacting the service,
//! 4. the service's [`RetryExecutor`] runs the remote call, retrying
//!    transient failures with backoff.
//!
//! A success is cached and reported to the breaker; a failure is reported
//! to the breaker and returned as a typed [`InvokeError`]. Rejected calls
//! are never retried internally.
//!
//! Per-service state lives in a [`ServiceRegistry`] that is built up front
//! and owned by the invoker.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use invoke_guard::{Invoker, RemoteError, RemoteRequest, ServiceConfig, ServiceRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = tower::service_fn(|req: RemoteRequest| async move {
//!     Ok::<_, RemoteError>(Bytes::from(format!("answer to {}", req.parameters["prompt"])))
//! });
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register("llm", &ServiceConfig::default(), Arc::new(llm))?;
//! let invoker = Invoker::builder(registry).build();
//!
//! let first = invoker.invoke("llm", "complete", json!({"prompt": "rust"})).await?;
//! let second = invoker.invoke("llm", "complete", json!({"prompt": "rust"})).await?;
//! assert_eq!(first, second);
//! assert_eq!(invoker.stats().cache_hits, 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod invocation;
mod registry;
mod remote;
mod report;

pub use config::{ConfigError, InvokerConfig, RateLimitMode, ServiceConfig};
pub use error::InvokeError;
pub use events::InvokeEvent;
pub use invocation::Invocation;
pub use registry::{ServiceEntry, ServiceEntryBuilder, ServiceRegistry};
pub use remote::{RemoteCall, RemoteRequest};
pub use report::{HealthReport, InvokerStats, ServiceHealth};

pub use invoke_guard_cache::{Cache, Clock, FileBackend, Fingerprint, MockClock, SystemClock};
pub use invoke_guard_circuitbreaker::{CircuitBreaker, CircuitState};
pub use invoke_guard_core::{CallContext, CancelReason, Cancelled, ErrorKind, RemoteError};
pub use invoke_guard_ratelimiter::{AcquireMode, RateLimiter};
pub use invoke_guard_retry::{RetryExecutor, RetryPolicy};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use invoke_guard_core::events::{EventListeners, FnListener};
use invoke_guard_ratelimiter::RateLimiterError;
use invoke_guard_retry::RetryError;
use report::Counters;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Suggested window for [`Invoker::invoke_batch`].
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

enum Served {
    Cache,
    Remote,
}

struct Inner {
    registry: ServiceRegistry,
    cache: Cache,
    counters: Counters,
    listeners: EventListeners<InvokeEvent>,
}

/// The facade every remote call goes through.
///
/// Cheap to clone; clones share the registry, the cache and the counters.
#[derive(Clone)]
pub struct Invoker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("services", &self.inner.registry.ids())
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Builder for [`Invoker`].
pub struct InvokerBuilder {
    registry: ServiceRegistry,
    cache: Option<Cache>,
    listeners: EventListeners<InvokeEvent>,
}

impl InvokerBuilder {
    /// Uses `cache` instead of a fresh unbounded in-memory cache.
    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Registers a listener for every facade event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&InvokeEvent) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(f));
        self
    }

    /// Builds the invoker.
    pub fn build(self) -> Invoker {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "invoke_calls_total",
                "Total number of facade calls by service and outcome"
            );
            describe_histogram!(
                "invoke_call_duration_seconds",
                "Wall time of facade calls, cache hits included"
            );
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Cache::builder().name("invoke-guard").build());
        Invoker {
            inner: Arc::new(Inner {
                registry: self.registry,
                cache,
                counters: Counters::default(),
                listeners: self.listeners,
            }),
        }
    }
}

impl Invoker {
    /// Starts building an invoker over `registry`.
    pub fn builder(registry: ServiceRegistry) -> InvokerBuilder {
        InvokerBuilder {
            registry,
            cache: None,
            listeners: EventListeners::new(),
        }
    }

    /// Builds an invoker from flat configuration.
    ///
    /// `remotes` must supply a collaborator for every configured service.
    /// When `persist_dir` is set the cache is backed by a [`FileBackend`]
    /// in that directory.
    pub async fn from_config<I>(config: &InvokerConfig, remotes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, Arc<dyn RemoteCall>)>,
    {
        let mut remotes: HashMap<String, Arc<dyn RemoteCall>> = remotes.into_iter().collect();
        let mut registry = ServiceRegistry::new();
        for (id, service) in &config.services {
            let remote = remotes
                .remove(id)
                .ok_or_else(|| ConfigError::MissingRemote(id.clone()))?;
            registry.register(id.clone(), service, remote)?;
        }

        let mut cache = Cache::builder()
            .name("invoke-guard")
            .max_entries(config.max_entries)
            .sweep_interval(config.sweep_interval());
        if let Some(dir) = &config.persist_dir {
            cache = cache.backend(Arc::new(FileBackend::open(dir).await?));
        }

        Ok(Self::builder(registry).cache(cache.build()).build())
    }

    /// The registered services.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    /// The shared response cache.
    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    /// Calls `operation` on `service_id` with default options.
    pub async fn invoke(
        &self,
        service_id: &str,
        operation: &str,
        parameters: serde_json::Value,
    ) -> Result<Bytes, InvokeError> {
        self.invoke_with(Invocation::new(service_id, operation, parameters), &CallContext::new())
            .await
    }

    /// Runs one invocation under `ctx`.
    ///
    /// Cancelling `ctx` or passing its deadline aborts whatever wait or
    /// remote call is in progress with [`InvokeError::Cancelled`].
    pub async fn invoke_with(
        &self,
        invocation: Invocation,
        ctx: &CallContext,
    ) -> Result<Bytes, InvokeError> {
        let started = Instant::now();
        let service_id = invocation.service_id.clone();
        let operation = invocation.operation.clone();

        let result = match self.inner.registry.get(&service_id) {
            Some(service) => self.run(service, invocation, ctx).await,
            None => Err(InvokeError::UnknownService(service_id.clone())),
        };

        let elapsed = started.elapsed();
        let event = match &result {
            Ok((_, Served::Cache)) => InvokeEvent::CacheHit {
                service_id: service_id.clone(),
                operation,
                timestamp: Instant::now(),
            },
            Ok((_, Served::Remote)) => {
                tracing::debug!(
                    service = %service_id,
                    operation = %operation,
                    duration_ms = elapsed.as_millis() as u64,
                    "call completed"
                );
                InvokeEvent::Completed {
                    service_id: service_id.clone(),
                    operation,
                    timestamp: Instant::now(),
                    duration: elapsed,
                }
            }
            Err(err) => {
                if matches!(
                    err,
                    InvokeError::Terminal(_) | InvokeError::RetriesExhausted { .. }
                ) {
                    tracing::warn!(service = %service_id, operation = %operation, error = %err, "call failed");
                } else {
                    tracing::debug!(service = %service_id, operation = %operation, error = %err, "call not completed");
                }
                InvokeEvent::Failed {
                    service_id: service_id.clone(),
                    operation,
                    timestamp: Instant::now(),
                    duration: elapsed,
                    outcome: err.outcome(),
                }
            }
        };
        self.emit(event);

        #[cfg(feature = "metrics")]
        {
            let outcome = match &result {
                Ok(_) => "success",
                Err(err) => err.outcome(),
            };
            counter!("invoke_calls_total", "service" => service_id.clone(), "outcome" => outcome)
                .increment(1);
            histogram!("invoke_call_duration_seconds", "service" => service_id)
                .record(elapsed.as_secs_f64());
        }

        result.map(|(body, _)| body)
    }

    async fn run(
        &self,
        service: &ServiceEntry,
        invocation: Invocation,
        ctx: &CallContext,
    ) -> Result<(Bytes, Served), InvokeError> {
        ctx.check()?;
        let counters = &self.inner.counters;
        let cache = &self.inner.cache;
        let key = Fingerprint::of(
            &invocation.service_id,
            &invocation.operation,
            &invocation.parameters,
        );

        if !invocation.bypass_cache {
            if let Some(body) = cache.get(&key).await {
                Counters::bump(&counters.cache_hits);
                tracing::debug!(service = %service.id(), operation = %invocation.operation, "served from cache");
                return Ok((body, Served::Cache));
            }
            Counters::bump(&counters.cache_misses);
        }

        let limiter = service.limiter();
        let admitted = match invocation.admission {
            Some(mode) => limiter.acquire(invocation.cost, mode, ctx).await,
            None => limiter.acquire_default(invocation.cost, ctx).await,
        };
        if let Err(err) = admitted {
            if let RateLimiterError::Cancelled(cancelled) = err {
                return Err(InvokeError::Cancelled(cancelled));
            }
            Counters::bump(&counters.rejected_by_rate_limit);
            return Err(InvokeError::RateLimitExceeded {
                service: service.id().to_string(),
                retry_after: err.retry_after(),
            });
        }

        let permit = service.breaker().allow_request().map_err(|rejected| {
            Counters::bump(&counters.rejected_by_breaker);
            InvokeError::from(rejected)
        })?;

        let remote = service.remote();
        let outcome = service
            .retry()
            .execute(ctx, |attempt| {
                Counters::bump(&counters.remote_calls);
                let call = remote.send(RemoteRequest {
                    service_id: invocation.service_id.clone(),
                    operation: invocation.operation.clone(),
                    parameters: invocation.parameters.clone(),
                    attempt,
                });
                async move {
                    let result = call.await;
                    if result.is_err() {
                        Counters::bump(&counters.remote_failures);
                    }
                    result
                }
            })
            .await;

        match outcome {
            Ok(body) => {
                permit.record_success();
                let ttl = invocation
                    .ttl
                    .unwrap_or_else(|| service.ttl_for(&invocation.operation));
                cache.put(&key, body.clone(), ttl).await;
                Ok((body, Served::Remote))
            }
            Err(RetryError::Cancelled(cancelled)) => {
                // unresolved permit only frees a half-open trial slot
                drop(permit);
                Err(InvokeError::Cancelled(cancelled))
            }
            Err(err) => {
                match err.remote_error() {
                    Some(remote_err) => permit.record::<()>(&Err(remote_err.clone())),
                    None => permit.record_failure(),
                }
                Err(err.into())
            }
        }
    }

    /// Runs `invocations` with at most `concurrency` in flight.
    ///
    /// Results come back in input order.
    pub async fn invoke_batch<I>(
        &self,
        invocations: I,
        concurrency: usize,
    ) -> Vec<Result<Bytes, InvokeError>>
    where
        I: IntoIterator<Item = Invocation>,
    {
        self.invoke_batch_with(invocations, concurrency, &CallContext::new())
            .await
    }

    /// [`invoke_batch`](Self::invoke_batch) under a shared context.
    pub async fn invoke_batch_with<I>(
        &self,
        invocations: I,
        concurrency: usize,
        ctx: &CallContext,
    ) -> Vec<Result<Bytes, InvokeError>>
    where
        I: IntoIterator<Item = Invocation>,
    {
        stream::iter(invocations)
            .map(|invocation| self.invoke_with(invocation, ctx))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Counters since construction or the last [`reset_stats`](Self::reset_stats).
    pub fn stats(&self) -> InvokerStats {
        self.inner.counters.snapshot()
    }

    /// Zeroes the counters.
    pub fn reset_stats(&self) {
        self.inner.counters.reset();
    }

    /// Breaker and bucket status of every service.
    pub fn health(&self) -> HealthReport {
        let services = self
            .inner
            .registry
            .ids()
            .into_iter()
            .filter_map(|id| self.inner.registry.get(id))
            .map(|service| {
                let snapshot = service.breaker().snapshot();
                ServiceHealth {
                    service_id: service.id().to_string(),
                    state: snapshot.state,
                    consecutive_failures: snapshot.consecutive_failures,
                    available_tokens: service.limiter().available_tokens(),
                    status: service.breaker().health_status(),
                }
            })
            .collect();
        HealthReport { services }
    }

    /// Closes the service's breaker and refills its bucket.
    pub fn reset_service(&self, service_id: &str) -> Result<(), InvokeError> {
        let service = self
            .inner
            .registry
            .get(service_id)
            .ok_or_else(|| InvokeError::UnknownService(service_id.to_string()))?;
        service.breaker().reset();
        service.limiter().reset();
        tracing::info!(service = %service_id, "service state reset");
        Ok(())
    }

    fn emit(&self, event: InvokeEvent) {
        self.inner.listeners.emit(&event);
    }
}

impl Service<Invocation> for Invoker {
    type Response = Bytes;
    type Error = InvokeError;
    type Future = BoxFuture<'static, Result<Bytes, InvokeError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let invoker = self.clone();
        Box::pin(async move { invoker.invoke_with(invocation, &CallContext::new()).await })
    }
}
