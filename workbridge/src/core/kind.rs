//! Failure kinds surfaced to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The classification of a failed call.
///
/// These nine kinds are the only failure vocabulary that leaves the crate;
/// raw transport errors and backend status codes are always mapped onto one
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, DNS or TLS failure, broken stream.
    Network,
    /// A deadline elapsed before the backend answered.
    Timeout,
    /// The backend asked us to slow down.
    RateLimited,
    /// The credential was rejected.
    AuthFailed,
    /// The work item (or endpoint) does not exist.
    NotFound,
    /// The expected version no longer matches the backend.
    Conflict,
    /// The request itself was rejected as invalid.
    ValidationFailed,
    /// The backend failed (5xx) or the circuit is open.
    ServerFault,
    /// Anything that fits none of the above.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Network,
        Self::Timeout,
        Self::RateLimited,
        Self::AuthFailed,
        Self::NotFound,
        Self::Conflict,
        Self::ValidationFailed,
        Self::ServerFault,
        Self::Unknown,
    ];

    /// Returns true if a failure of this kind is transient.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerFault | Self::Timeout | Self::Network
        )
    }

    /// Default human-readable description, used when no message is available.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Timeout => "request timed out",
            Self::RateLimited => "rate limited by backend",
            Self::AuthFailed => "authentication failed",
            Self::NotFound => "work item not found",
            Self::Conflict => "version conflict",
            Self::ValidationFailed => "request rejected as invalid",
            Self::ServerFault => "backend server fault",
            Self::Unknown => "unknown failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::AuthFailed => write!(f, "auth_failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::ServerFault => write!(f, "server_fault"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
