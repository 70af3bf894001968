//! Core types shared by every layer of the client.
//!
//! This module contains:
//! - The failure kinds surfaced to callers
//! - The `Outcome` result container and its `Failure` type

mod kind;
mod outcome;

pub use kind::ErrorKind;
pub use outcome::{Failure, FailureOrigin, Outcome};
