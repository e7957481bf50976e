use invoke_guard_core::{Cancelled, RemoteError};

/// Errors returned by [`RetryExecutor::execute`](crate::RetryExecutor::execute).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// An attempt failed with an error that is not retried.
    #[error("non-retryable failure on attempt {attempts}: {source}")]
    Terminal {
        /// Attempts made, including the failing one.
        attempts: usize,
        /// The error that stopped the loop.
        source: RemoteError,
    },

    /// Every permitted attempt failed transiently.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: usize,
        /// The final attempt's error.
        last: RemoteError,
    },

    /// The caller cancelled during an attempt or a backoff wait.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl RetryError {
    /// Number of attempts made before giving up, when known.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            RetryError::Terminal { attempts, .. } | RetryError::RetriesExhausted { attempts, .. } => {
                Some(*attempts)
            }
            RetryError::Cancelled(_) => None,
        }
    }

    /// The remote error behind this failure, if any.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            RetryError::Terminal { source, .. } => Some(source),
            RetryError::RetriesExhausted { last, .. } => Some(last),
            RetryError::Cancelled(_) => None,
        }
    }
}
