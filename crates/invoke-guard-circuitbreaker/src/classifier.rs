//! Decides which remote errors count against the breaker.

use invoke_guard_core::RemoteError;
use std::sync::Arc;

/// Classifies whether a remote error is a breaker failure.
///
/// Errors classified as non-failures are recorded as successes: the
/// remote service answered, it just did not like the request.
pub trait FailureClassifier: Send + Sync {
    /// Returns `true` if `error` should count toward opening the breaker.
    fn is_failure(&self, error: &RemoteError) -> bool;
}

/// Counts every remote error as a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn is_failure(&self, _error: &RemoteError) -> bool {
        true
    }
}

/// Counts only transient errors as failures.
///
/// A terminal error such as a rejected credential says nothing about the
/// remote service's health.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientOnly;

impl FailureClassifier for TransientOnly {
    fn is_failure(&self, error: &RemoteError) -> bool {
        error.is_transient()
    }
}

/// A classifier backed by a closure.
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(&RemoteError) -> bool + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> FailureClassifier for FnClassifier<F>
where
    F: Fn(&RemoteError) -> bool + Send + Sync,
{
    fn is_failure(&self, error: &RemoteError) -> bool {
        (self.f)(error)
    }
}

pub(crate) type SharedClassifier = Arc<dyn FailureClassifier>;
