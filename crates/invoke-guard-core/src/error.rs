//! Classified errors returned by remote-call collaborators.
//!
//! Every failure reported by the transport is tagged as [`ErrorKind::Transient`]
//! (worth retrying) or [`ErrorKind::Terminal`] (will not succeed on retry).
//! The retry executor and the circuit breaker only ever look at this
//! classification, never at transport details.

use std::fmt;

/// Whether a remote failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The call may succeed if repeated later (timeouts, 429, 5xx).
    Transient,
    /// The call will not succeed on retry (bad credentials, malformed request).
    Terminal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => f.write_str("transient"),
            ErrorKind::Terminal => f.write_str("terminal"),
        }
    }
}

/// A failure reported by the remote-call collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} remote error", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
            status: None,
        }
    }

    /// Creates a terminal error.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Terminal,
            message: message.into(),
            status: None,
        }
    }

    /// Classifies an HTTP status code.
    ///
    /// 408, 425, 429 and every 5xx are transient. Everything else
    /// (including 401 and 403) is terminal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            408 | 425 | 429 | 500..=599 => ErrorKind::Transient,
            _ => ErrorKind::Terminal,
        };
        Self {
            kind,
            message: message.into(),
            status: Some(status),
        }
    }

    /// Attaches a status code without changing the classification.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns the classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// Returns true if a retry cannot succeed.
    pub fn is_terminal(&self) -> bool {
        self.kind == ErrorKind::Terminal
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status code, if the transport provided one.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}
