//! Consecutive-failure circuit breaker.
//!
//! One breaker guards one remote service. It counts consecutive failures
//! while closed and opens once the count reaches the threshold. While open,
//! every call is rejected without reaching the service. The first call after
//! the open timeout becomes the single half-open trial: its success closes
//! the breaker, its failure reopens it and restarts the timeout.
//!
//! The Open to HalfOpen move is evaluated lazily inside
//! [`CircuitBreaker::allow_request`]; there is no timer task.
//!
//! ## Outcome reporting
//!
//! [`allow_request`](CircuitBreaker::allow_request) hands out a [`Permit`].
//! Reporting through the permit consumes it, so each admitted call reports
//! exactly once. A permit dropped without reporting (for example because the
//! caller was cancelled) only frees the half-open trial slot.
//!
//! ```rust
//! use invoke_guard_circuitbreaker::{CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::builder()
//!     .name("images")
//!     .failure_threshold(3)
//!     .open_timeout(Duration::from_secs(30))
//!     .build();
//!
//! for _ in 0..3 {
//!     breaker.allow_request().unwrap().record_failure();
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(breaker.allow_request().is_err());
//! # }
//! ```

mod circuit;
mod classifier;
mod config;
mod error;
mod events;

pub use circuit::{CircuitSnapshot, CircuitState};
pub use classifier::{DefaultClassifier, FailureClassifier, FnClassifier, TransientOnly};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::Rejected;
pub use events::CircuitBreakerEvent;

use circuit::{Circuit, Grant};
use invoke_guard_core::RemoteError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};

struct Shared {
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
    state_atomic: Arc<AtomicU8>,
}

/// A circuit breaker for one remote service.
///
/// Clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Starts building a breaker.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub(crate) fn from_config(config: CircuitBreakerConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Total number of calls through the circuit breaker"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Total number of circuit breaker state transitions"
            );
            describe_gauge!(
                "circuitbreaker_state",
                "Current circuit breaker state (0=closed, 1=open, 2=half-open)"
            );
        }

        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            shared: Arc::new(Shared {
                circuit: Mutex::new(Circuit::new(Arc::clone(&state_atomic))),
                state_atomic,
                config,
            }),
        }
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.shared
            .circuit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Asks whether a call may proceed.
    ///
    /// In `HalfOpen` only one caller at a time receives a permit; everyone
    /// else is rejected until that trial resolves.
    pub fn allow_request(&self) -> Result<Permit, Rejected> {
        let mut circuit = self.circuit();
        match circuit.try_acquire(&self.shared.config) {
            Ok(grant) => Ok(Permit {
                breaker: self.clone(),
                grant,
                resolved: false,
            }),
            Err(retry_after) => Err(Rejected {
                name: self.shared.config.name.clone(),
                state: circuit.state(),
                retry_after,
            }),
        }
    }

    /// Current state, read without locking.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.shared.state_atomic.load(Ordering::Acquire))
    }

    /// Consistent view of state and counters.
    pub fn snapshot(&self) -> CircuitSnapshot {
        self.circuit().snapshot()
    }

    /// Returns true while open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Opens the breaker now and restarts the open timeout.
    pub fn force_open(&self) {
        self.circuit().force_open(&self.shared.config);
    }

    /// Closes the breaker and clears the failure count.
    pub fn reset(&self) {
        self.circuit().reset(&self.shared.config);
    }

    /// `"healthy"` when closed, `"degraded"` when half-open, `"unhealthy"` when open.
    pub fn health_status(&self) -> &'static str {
        match self.state() {
            CircuitState::Closed => "healthy",
            CircuitState::HalfOpen => "degraded",
            CircuitState::Open => "unhealthy",
        }
    }
}

/// Admission to make one call. Report its outcome exactly once.
#[must_use = "dropping a permit without recording an outcome discards the call's result"]
pub struct Permit {
    breaker: CircuitBreaker,
    grant: Grant,
    resolved: bool,
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("breaker", &self.breaker.name())
            .field("trial", &self.is_trial())
            .finish()
    }
}

impl Permit {
    /// Returns true if this permit is the half-open trial.
    pub fn is_trial(&self) -> bool {
        matches!(self.grant, Grant::Trial { .. })
    }

    /// Reports a successful call.
    pub fn record_success(mut self) {
        self.resolved = true;
        self.breaker
            .circuit()
            .record_success(self.grant, &self.breaker.shared.config);
    }

    /// Reports a failed call.
    pub fn record_failure(mut self) {
        self.resolved = true;
        self.breaker
            .circuit()
            .record_failure(self.grant, &self.breaker.shared.config);
    }

    /// Reports `result`, consulting the classifier for errors.
    pub fn record<T>(self, result: &Result<T, RemoteError>) {
        let failed = match result {
            Ok(_) => false,
            Err(e) => self.breaker.shared.config.classifier.is_failure(e),
        };
        if failed {
            self.record_failure();
        } else {
            self.record_success();
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.circuit().release(self.grant);
        }
    }
}
