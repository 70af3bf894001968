//! Single-attempt transport.
//!
//! A [`Transport`] sends exactly one request and reports exactly one
//! [`RawOutcome`]. Retrying, classification and circuit breaking live above
//! it in [`crate::resilience`].

mod auth;
mod envelope;
#[cfg(feature = "http")]
mod http;

pub use auth::{AuthPlacement, AuthScheme, Credential, CredentialProvider};
#[cfg(test)]
pub use auth::MockCredentialProvider;
pub use envelope::{
    Method, RawOutcome, ResponseEnvelope, TransportFailure, TransportFailureKind, TransportRequest,
};
#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig};

use async_trait::async_trait;

/// Sends one request to a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` with `credential` and returns what happened.
    async fn send(&self, request: &TransportRequest, credential: &Credential) -> RawOutcome;
}
