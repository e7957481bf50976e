//! Per-call cancellation and deadlines.
//!
//! A [`CallContext`] travels with one facade call. Every suspension point
//! (rate-limiter wait, backoff sleep, the remote call itself) goes through
//! [`CallContext::sleep`] or [`CallContext::run`], so cancelling the token or
//! passing the deadline aborts whichever wait is in progress.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Token,
    /// The call's deadline passed.
    DeadlineExceeded,
}

/// The call was aborted before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    /// What triggered the abort.
    pub reason: CancelReason,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            CancelReason::Token => f.write_str("call cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("call deadline exceeded"),
        }
    }
}

impl std::error::Error for Cancelled {}

/// Cancellation token plus optional deadline for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context driven by an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now. A timeout too large to represent
    /// leaves the context without a deadline.
    pub fn timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.deadline(deadline),
            None => self,
        }
    }

    /// Returns the cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if one is set.
    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            return Err(Cancelled {
                reason: CancelReason::Token,
            });
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(Cancelled {
                reason: CancelReason::DeadlineExceeded,
            }),
            _ => Ok(()),
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drives `fut` to completion unless cancelled first.
    ///
    /// On cancellation the future is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled { reason: CancelReason::Token }),
            _ = deadline => Err(Cancelled { reason: CancelReason::DeadlineExceeded }),
            out = fut => Ok(out),
        }
    }
}
