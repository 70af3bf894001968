//! Bounded retry loop around a single logical operation.
//!
//! Each attempt passes through cancellation, elapsed-budget and breaker
//! admission checks. Attempts never overlap.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::backoff::BackoffGenerator;
use super::breaker::CircuitBreaker;
use crate::cancellation::CancellationToken;
use crate::core::{ErrorKind, Failure, Outcome};
use crate::observability::{EventSink, NoOpEventSink};

/// Attempt and time limits for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wall-clock budget across all attempts and waits.
    pub max_elapsed: Duration,
    /// Optional cap on a single attempt; never exceeds the remaining budget.
    pub per_attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            max_elapsed: Duration::from_secs(60),
            per_attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Progress of one logical operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext {
    attempt: u32,
    started: Instant,
    policy: RetryPolicy,
}

impl RetryContext {
    /// Starts the clock for an operation.
    #[must_use]
    pub fn start(policy: RetryPolicy) -> Self {
        Self {
            attempt: 0,
            started: Instant::now(),
            policy,
        }
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Time since the operation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left before `max_elapsed`.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.policy.max_elapsed.saturating_sub(self.elapsed())
    }

    /// Whether another attempt is allowed by the attempt counter.
    #[must_use]
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.policy.max_attempts.max(1)
    }

    /// Whether waiting `wait` still leaves time for another attempt.
    #[must_use]
    pub fn can_wait(&self, wait: Duration) -> bool {
        wait < self.remaining()
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    fn attempt_deadline(&self) -> Duration {
        let remaining = self.remaining();
        self.policy
            .per_attempt_timeout
            .map_or(remaining, |limit| limit.min(remaining))
    }
}

/// Runs operations under a [`RetryPolicy`] with backoff between attempts.
pub struct RetryEngine {
    policy: RetryPolicy,
    backoff: BackoffGenerator,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine")
            .field("policy", &self.policy)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl RetryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(policy: RetryPolicy, backoff: BackoffGenerator) -> Self {
        Self {
            policy,
            backoff,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Routes retry events to a sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `attempt_fn` until it succeeds, fails terminally, or the budget
    /// runs out.
    ///
    /// `attempt_fn` receives the 1-based attempt number. A circuit-open
    /// rejection is returned immediately. Cancellation races both the
    /// in-flight attempt and the wait, and does not count as an attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        breaker: &CircuitBreaker,
        cancel: Option<&CancellationToken>,
        mut attempt_fn: F,
    ) -> Outcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let mut ctx = RetryContext::start(self.policy);
        let mut last_failure: Option<Failure> = None;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(operation, attempt = ctx.attempt(), "Cancelled before attempt");
                return Err(Failure::cancelled());
            }

            if ctx.remaining().is_zero() {
                return Err(last_failure.unwrap_or_else(|| {
                    Failure::new(ErrorKind::Timeout, "elapsed budget exhausted before first attempt")
                }));
            }

            let permit = breaker.try_acquire()?;
            let deadline = ctx.attempt_deadline();
            let attempt = ctx.begin_attempt();

            let outcome = tokio::select! {
                biased;
                () = wait_for_cancel(cancel) => {
                    debug!(operation, attempt, "Cancelled during attempt");
                    return Err(Failure::cancelled());
                }
                result = tokio::time::timeout(deadline, attempt_fn(attempt)) => {
                    result.unwrap_or_else(|_| {
                        Err(Failure::new(
                            ErrorKind::Timeout,
                            format!("attempt {attempt} exceeded {} ms", deadline.as_millis()),
                        ))
                    })
                }
            };

            permit.record(&outcome);

            let failure = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() {
                debug!(operation, attempt, error = %failure, "Terminal failure");
                return Err(failure);
            }

            if !ctx.has_attempts_left() {
                self.exhausted(operation, &ctx, &failure, "attempts");
                return Err(failure);
            }

            let wait = self.backoff.next(attempt, failure.retry_after());
            if !ctx.can_wait(wait) {
                self.exhausted(operation, &ctx, &failure, "elapsed");
                return Err(failure);
            }

            warn!(
                operation,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %failure,
                "Retrying after failure"
            );
            self.sink.try_emit(
                "retry.scheduled",
                Some(serde_json::json!({
                    "operation": operation,
                    "attempt": attempt,
                    "wait_ms": wait.as_millis() as u64,
                    "kind": failure.kind(),
                })),
            );

            tokio::select! {
                biased;
                () = wait_for_cancel(cancel) => {
                    debug!(operation, attempt, "Cancelled during backoff");
                    return Err(Failure::cancelled());
                }
                () = tokio::time::sleep(wait) => {}
            }

            last_failure = Some(failure);
        }
    }

    fn exhausted(&self, operation: &str, ctx: &RetryContext, failure: &Failure, budget: &str) {
        warn!(
            operation,
            attempts = ctx.attempt(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            budget,
            error = %failure,
            "Retry budget exhausted"
        );
        self.sink.try_emit(
            "retry.exhausted",
            Some(serde_json::json!({
                "operation": operation,
                "attempts": ctx.attempt(),
                "budget": budget,
                "kind": failure.kind(),
            })),
        );
    }
}

async fn wait_for_cancel(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
