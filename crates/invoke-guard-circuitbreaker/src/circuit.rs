use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are allowed.
    Closed = 0,
    /// Calls are rejected until the open timeout elapses.
    Open = 1,
    /// A single trial call decides whether to close or reopen.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success or state change.
    pub consecutive_failures: u32,
    /// Whether a half-open trial is outstanding.
    pub trial_in_flight: bool,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
}

/// What an issued permit is allowed to influence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    /// A normal call admitted while closed.
    Normal { generation: u64 },
    /// The half-open trial.
    Trial { generation: u64 },
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    consecutive_failures: u32,
    last_state_change: Instant,
    trial_in_flight: bool,
    // bumped on every transition; outcomes from an older generation are ignored
    generation: u64,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        state_atomic.store(CircuitState::Closed as u8, Ordering::Release);
        Self {
            state: CircuitState::Closed,
            state_atomic,
            consecutive_failures: 0,
            last_state_change: Instant::now(),
            trial_in_flight: false,
            generation: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            trial_in_flight: self.trial_in_flight,
            time_since_state_change: self.last_state_change.elapsed(),
        }
    }

    /// Decides whether a call may proceed. `Err` carries the remaining open
    /// time when the breaker is open.
    pub(crate) fn try_acquire(
        &mut self,
        config: &CircuitBreakerConfig,
    ) -> Result<Grant, Option<Duration>> {
        match self.state {
            CircuitState::Closed => {
                self.emit_permitted(config);
                Ok(Grant::Normal {
                    generation: self.generation,
                })
            }
            CircuitState::Open => {
                let elapsed = self.last_state_change.elapsed();
                if elapsed >= config.open_timeout {
                    self.transition_to(CircuitState::HalfOpen, config);
                    self.trial_in_flight = true;
                    self.emit_permitted(config);
                    Ok(Grant::Trial {
                        generation: self.generation,
                    })
                } else {
                    let remaining = config.open_timeout - elapsed;
                    self.emit_rejected(config, Some(remaining));
                    Err(Some(remaining))
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    self.emit_rejected(config, None);
                    Err(None)
                } else {
                    self.trial_in_flight = true;
                    self.emit_permitted(config);
                    Ok(Grant::Trial {
                        generation: self.generation,
                    })
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, grant: Grant, config: &CircuitBreakerConfig) {
        match (grant, self.state) {
            (Grant::Normal { generation }, CircuitState::Closed)
                if generation == self.generation =>
            {
                self.consecutive_failures = 0;
            }
            (Grant::Trial { generation }, CircuitState::HalfOpen)
                if generation == self.generation =>
            {
                self.trial_in_flight = false;
                self.transition_to(CircuitState::Closed, config);
            }
            _ => {
                tracing::trace!(breaker = %config.name, state = ?self.state, "ignoring stale success");
                return;
            }
        }

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "success").increment(1);
    }

    pub(crate) fn record_failure(&mut self, grant: Grant, config: &CircuitBreakerConfig) {
        match (grant, self.state) {
            (Grant::Normal { generation }, CircuitState::Closed)
                if generation == self.generation =>
            {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.emit_failure(config);
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, config);
                }
            }
            (Grant::Trial { generation }, CircuitState::HalfOpen)
                if generation == self.generation =>
            {
                self.trial_in_flight = false;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.emit_failure(config);
                self.transition_to(CircuitState::Open, config);
            }
            _ => {
                tracing::trace!(breaker = %config.name, state = ?self.state, "ignoring stale failure");
            }
        }
    }

    /// A permit was dropped without an outcome.
    pub(crate) fn release(&mut self, grant: Grant) {
        if let Grant::Trial { generation } = grant {
            if self.state == CircuitState::HalfOpen && generation == self.generation {
                self.trial_in_flight = false;
            }
        }
    }

    pub(crate) fn force_open(&mut self, config: &CircuitBreakerConfig) {
        if self.state == CircuitState::Open {
            // restart the timeout
            self.last_state_change = Instant::now();
            return;
        }
        self.transition_to(CircuitState::Open, config);
    }

    pub(crate) fn reset(&mut self, config: &CircuitBreakerConfig) {
        self.transition_to(CircuitState::Closed, config);
        self.consecutive_failures = 0;
        self.trial_in_flight = false;
    }

    fn transition_to(&mut self, state: CircuitState, config: &CircuitBreakerConfig) {
        if self.state == state {
            return;
        }

        let from_state = self.state;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                from_state,
                to_state: state,
            });

        tracing::info!(
            breaker = %config.name,
            from = from_state.as_str(),
            to = state.as_str(),
            consecutive_failures = self.consecutive_failures,
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => config.name.clone(),
                "from" => from_state.as_str(),
                "to" => state.as_str()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => config.name.clone())
                .set(state as u8 as f64);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = Instant::now();
        self.generation = self.generation.wrapping_add(1);
        if state == CircuitState::Closed {
            self.consecutive_failures = 0;
        }
        if state != CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    fn emit_permitted(&self, config: &CircuitBreakerConfig) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallPermitted {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                state: self.state,
            });
    }

    fn emit_rejected(&self, config: &CircuitBreakerConfig, retry_after: Option<Duration>) {
        tracing::debug!(breaker = %config.name, state = ?self.state, "call rejected");
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallRejected {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                state: self.state,
                retry_after,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "rejected").increment(1);
    }

    fn emit_failure(&self, config: &CircuitBreakerConfig) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                state: self.state,
                consecutive_failures: self.consecutive_failures,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "failure").increment(1);
    }
}
