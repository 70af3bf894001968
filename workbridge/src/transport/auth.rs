//! Credentials and how they are attached to requests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::Backend;

/// An opaque secret supplied by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the secret for header construction.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Supplies the credential for each attempt.
///
/// Refreshing is the provider's business; the client only asks.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Returns the credential to use now.
    fn credential(&self) -> Credential;
}

impl CredentialProvider for Credential {
    fn credential(&self) -> Credential {
        self.clone()
    }
}

/// How a credential is injected into a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <secret>`.
    Bearer,
    /// `Authorization: Basic base64(<username>:<secret>)`.
    Basic {
        /// User name; Azure DevOps PATs use an empty one.
        #[serde(default)]
        username: String,
    },
    /// `<name>: <secret>`.
    Header {
        /// Header name.
        name: String,
    },
    /// `?<param>=<secret>`.
    Query {
        /// Query parameter name.
        param: String,
    },
}

/// Where a credential ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlacement {
    /// As a header.
    Header(String, String),
    /// As a query parameter.
    Query(String, String),
}

impl AuthScheme {
    /// The scheme a backend uses unless configured otherwise.
    #[must_use]
    pub fn default_for(backend: Backend) -> Self {
        match backend {
            Backend::AzureDevops => Self::Basic {
                username: String::new(),
            },
            Backend::GitHub | Backend::Jira => Self::Bearer,
        }
    }

    /// Computes the header or query parameter carrying `credential`.
    #[must_use]
    pub fn placement(&self, credential: &Credential) -> AuthPlacement {
        let secret = credential.expose();
        match self {
            Self::Bearer => AuthPlacement::Header("Authorization".into(), format!("Bearer {secret}")),
            Self::Basic { username } => AuthPlacement::Header(
                "Authorization".into(),
                format!("Basic {}", STANDARD.encode(format!("{username}:{secret}"))),
            ),
            Self::Header { name } => AuthPlacement::Header(name.clone(), secret.to_string()),
            Self::Query { param } => AuthPlacement::Query(param.clone(), secret.to_string()),
        }
    }
}
