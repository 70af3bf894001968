//! # Workbridge
//!
//! A resilient work-item client for Azure DevOps, GitHub and Jira.
//!
//! Workbridge puts the three work-item APIs behind one canonical model and
//! keeps calls safe under failure:
//!
//! - **Classification**: every transport outcome maps to one [`core::ErrorKind`]
//! - **Bounded retry**: exponential backoff with jitter and `Retry-After` floors
//! - **Circuit breaking**: per-target breakers with a single half-open probe
//! - **Canonical model**: data-driven translation of states, types and fields
//! - **Safe writes**: idempotency keys on create, version checks on update
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use workbridge::prelude::*;
//!
//! let target = BackendTarget::new(Backend::GitHub, "https://api.github.com")
//!     .with_project("octo/app");
//! let client = WorkItemClient::new(target, Credential::new(token), ClientPolicy::default())?;
//!
//! let draft = WorkItemDraft::new(WorkItemType::Bug, "Login fails on Safari");
//! let item = client.create_work_item(&draft, &IdempotencyKey::generate()).await?;
//!
//! let patch = WorkItemPatch::new().with_state(CanonicalState::Closed);
//! client.update_work_item(item.id(), &patch, item.version_token()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod idempotency;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod testing;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{WorkItemClient, WorkItemClientBuilder};
    pub use crate::config::{ClientConfig, ClientPolicy, ValidationReport};
    pub use crate::core::{ErrorKind, Failure, Outcome};
    pub use crate::errors::{ConfigError, WorkbridgeError};
    pub use crate::idempotency::IdempotencyKey;
    pub use crate::model::{
        fields, Backend, BackendTarget, CanonicalState, CanonicalWorkItem, WorkItemDraft,
        WorkItemPatch, WorkItemQuery, WorkItemType,
    };
    pub use crate::observability::{
        init_tracing, CollectingEventSink, EventSink, LogFormat, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::resilience::{BreakerConfig, CircuitState, RetryAfterMode, RetryPolicy};
    pub use crate::transport::{AuthScheme, Credential, CredentialProvider, Transport};
}
