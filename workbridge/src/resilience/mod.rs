//! The resilience pipeline: classification, backoff, circuit breaking and
//! bounded retry.
//!
//! Layering, innermost first:
//! - [`classify`] turns a raw transport outcome into a [`crate::core::Failure`]
//! - [`CircuitBreaker`] decides whether a call may reach the backend at all
//! - [`RetryEngine`] repeats admitted calls with [`BackoffGenerator`] waits

mod backoff;
mod breaker;
mod classify;
mod retry;

pub use backoff::{BackoffGenerator, RetryAfterMode, DEFAULT_JITTER};
pub use breaker::{
    BreakerConfig, BreakerPermit, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState,
};
pub use classify::{classify, classify_at, into_outcome, parse_retry_after, retry_after_hint, Classification};
pub use retry::{RetryContext, RetryEngine, RetryPolicy};
