//! The result container shared by every layer of the client.

use super::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// The outcome of any client operation.
///
/// A success carries only the value; a failure always carries a
/// classified [`Failure`].
pub type Outcome<T> = Result<T, Failure>;

/// Where a failure was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailureOrigin {
    /// The backend (or the network path to it) produced the failure.
    #[default]
    Backend,
    /// The circuit breaker refused to admit the call.
    CircuitOpen,
    /// The caller cancelled the call.
    Cancelled,
    /// The client rejected the call before sending anything.
    Local,
}

/// A classified failure.
///
/// The message is never empty: an empty message is replaced with the
/// kind's default description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
    origin: FailureOrigin,
}

impl Failure {
    /// Creates a backend failure whose retryability follows its kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::build(kind, message.into(), kind.is_retryable(), FailureOrigin::Backend)
    }

    /// Creates a failure that must not be retried regardless of its kind.
    #[must_use]
    pub fn terminal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::build(kind, message.into(), false, FailureOrigin::Backend)
    }

    /// Creates a failure raised by the client itself, before any I/O.
    #[must_use]
    pub fn local(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::build(kind, message.into(), false, FailureOrigin::Local)
    }

    /// The failure returned when the caller cancels a call.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::build(
            ErrorKind::Unknown,
            "cancelled".to_string(),
            false,
            FailureOrigin::Cancelled,
        )
    }

    /// The failure returned when an open circuit rejects a call.
    #[must_use]
    pub fn circuit_open(target: &str) -> Self {
        Self::build(
            ErrorKind::ServerFault,
            format!("CircuitOpen: backend '{target}' is unavailable, calls are suspended"),
            false,
            FailureOrigin::CircuitOpen,
        )
    }

    fn build(kind: ErrorKind, message: String, retryable: bool, origin: FailureOrigin) -> Self {
        let message = if message.trim().is_empty() {
            kind.description().to_string()
        } else {
            message
        };

        Self {
            kind,
            message,
            retryable,
            retry_after: None,
            origin,
        }
    }

    /// Attaches a minimum wait requested by the backend.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Returns the failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the failure may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Returns the backend's retry-after hint, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Returns where the failure was produced.
    #[must_use]
    pub fn origin(&self) -> FailureOrigin {
        self.origin
    }

    /// Returns true if an open circuit rejected the call.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        self.origin == FailureOrigin::CircuitOpen
    }

    /// Returns true if the caller cancelled the call.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.origin == FailureOrigin::Cancelled
    }

    /// A short hint a user interface can show next to the message.
    #[must_use]
    pub fn guidance(&self) -> &'static str {
        match (self.origin, self.kind) {
            (FailureOrigin::CircuitOpen, _) => {
                "the backend is unavailable; stop sending requests and try again later"
            }
            (FailureOrigin::Cancelled, _) => "the operation was cancelled",
            (_, ErrorKind::RateLimited) => "rate limited; retries happen automatically",
            (_, ErrorKind::AuthFailed) => "refresh or replace the credential and retry",
            (_, ErrorKind::NotFound) => "the work item does not exist or was deleted",
            (_, ErrorKind::Conflict) => {
                "the work item changed since it was read; fetch it again and re-apply the change"
            }
            (_, ErrorKind::ValidationFailed) => "the input was rejected; fix it and resubmit",
            (_, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::ServerFault) => {
                "the backend could not be reached reliably; try again later"
            }
            (_, ErrorKind::Unknown) => "an unexpected failure occurred",
        }
    }
}
