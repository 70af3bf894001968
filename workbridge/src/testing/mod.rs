//! Test doubles for code built on the client.
//!
//! - [`ScriptedTransport`]: replays queued raw outcomes
//! - [`InMemoryBackend`]: a stateful simulator of the three backends
//! - assertions on [`crate::core::Outcome`]s

mod assertions;
mod backend;
mod scripted;

pub use assertions::{assert_cancelled, assert_circuit_open, assert_failure_kind, assert_success};
pub use backend::{Fault, InMemoryBackend, SIMULATED_BASE_URL};
pub use scripted::ScriptedTransport;
