//! Construction and configuration errors.
//!
//! Failures of calls made against a backend are [`crate::core::Failure`]s;
//! the types here cover everything that can go wrong before the first call.

use thiserror::Error;

/// The main error type for building a client.
#[derive(Debug, Error)]
pub enum WorkbridgeError {
    /// The configuration was rejected.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The transport could not be set up.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A builder was finished without a required part.
    #[error("Missing {0}")]
    Missing(&'static str),
}

/// Reasons a configuration document is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document parsed but failed validation.
    #[error("Invalid configuration: {}", .errors.join("; "))]
    Invalid {
        /// Every validation error found.
        errors: Vec<String>,
    },
}

impl ConfigError {
    /// Creates a validation error from a list of problems.
    #[must_use]
    pub fn invalid(errors: Vec<String>) -> Self {
        Self::Invalid { errors }
    }

    /// Returns the individual validation problems, if any.
    #[must_use]
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid { errors } => errors,
            Self::Parse(_) => &[],
        }
    }
}
