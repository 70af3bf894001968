//! Cooperative cancellation of in-flight calls.

mod token;

pub use token::CancellationToken;
