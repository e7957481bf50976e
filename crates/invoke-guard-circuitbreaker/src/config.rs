use crate::classifier::{DefaultClassifier, FailureClassifier, FnClassifier, SharedClassifier};
use crate::events::CircuitBreakerEvent;
use crate::{CircuitBreaker, CircuitState};
use invoke_guard_core::events::{EventListeners, FnListener};
use invoke_guard_core::RemoteError;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`CircuitBreaker`].
pub struct CircuitBreakerConfig {
    pub(crate) name: String,
    pub(crate) failure_threshold: u32,
    pub(crate) open_timeout: Duration,
    pub(crate) classifier: SharedClassifier,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// How long the breaker stays open before admitting a trial.
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// Name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerConfigBuilder {
    name: String,
    failure_threshold: u32,
    open_timeout: Duration,
    classifier: SharedClassifier,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Creates a builder.
    ///
    /// Defaults:
    /// - failure_threshold: 5
    /// - open_timeout: 300 seconds
    /// - every remote error counts as a failure
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            failure_threshold: 5,
            open_timeout: Duration::from_secs(300),
            classifier: Arc::new(DefaultClassifier),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name used in events, logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Consecutive failures that open the breaker. Values below 1 are raised to 1.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// How long the breaker stays open before the next call becomes a trial.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Uses `classifier` to decide which errors are failures.
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: FailureClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Uses a closure to decide which errors are failures.
    pub fn failure_classifier<F>(self, f: F) -> Self
    where
        F: Fn(&RemoteError) -> bool + Send + Sync + 'static,
    {
        self.classifier(FnClassifier::new(f))
    }

    /// Registers a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StateTransition {
                from_state,
                to_state,
                ..
            } = event
            {
                f(*from_state, *to_state);
            }
        }));
        self
    }

    /// Registers a callback for rejected calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for recorded failures, given the running count.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::FailureRecorded {
                consecutive_failures,
                ..
            } = event
            {
                f(*consecutive_failures);
            }
        }));
        self
    }

    /// Registers a listener for every breaker event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&CircuitBreakerEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the breaker.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::from_config(CircuitBreakerConfig {
            name: self.name,
            failure_threshold: self.failure_threshold,
            open_timeout: self.open_timeout,
            classifier: self.classifier,
            event_listeners: self.event_listeners,
        })
    }
}
