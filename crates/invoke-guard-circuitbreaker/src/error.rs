use crate::CircuitState;
use std::time::Duration;

/// The breaker refused a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' rejected the call ({state:?})")]
pub struct Rejected {
    /// Name of the breaker.
    pub name: String,
    /// State at the time of rejection.
    pub state: CircuitState,
    /// Time until the open timeout elapses, when known.
    pub retry_after: Option<Duration>,
}
