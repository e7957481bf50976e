//! Core infrastructure for invoke-guard.
//!
//! This crate provides functionality shared by every invoke-guard component:
//! - Event system for observability
//! - Classified remote errors ([`RemoteError`])
//! - Per-call cancellation and deadlines ([`CallContext`])

pub mod context;
pub mod error;
pub mod events;

pub use context::{CallContext, Cancelled, CancelReason};
pub use error::{ErrorKind, RemoteError};
pub use events::{EventListener, EventListeners, FnListener, GuardEvent};
