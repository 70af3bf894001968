//! Per-target circuit breaker.
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     retryable failures reach the threshold within the window
//! Open     → HalfOpen: the current open duration has elapsed (checked on admission)
//! HalfOpen → Closed:   the single probe gets an answer from the backend
//! HalfOpen → Open:     the probe fails retryably; open duration doubles up to the ceiling
//! ```
//!
//! Non-retryable failures say nothing about backend health and never move
//! the counter. All transitions happen under one lock per target.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{Failure, Outcome};
use crate::observability::{EventSink, NoOpEventSink};

/// The state of one target's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without touching the backend.
    Open,
    /// A single probe call is testing the backend.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker thresholds and durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Retryable failures within the window that open the circuit.
    pub failure_threshold: u32,
    /// Window over which failures are counted.
    pub failure_window: Duration,
    /// Initial time the circuit stays open.
    pub open_duration: Duration,
    /// Ceiling for the open duration after repeated failed probes.
    pub max_open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            max_open_duration: Duration::from_secs(300),
        }
    }
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Target identifier.
    pub target: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures counted in the current window.
    pub failures: u32,
    /// How long the circuit stays open on the next (or current) opening.
    pub open_duration: Duration,
    /// Time since the last transition.
    pub since_transition: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    window_started: Instant,
    last_transition: Instant,
    open_duration: Duration,
    probe_in_flight: bool,
}

/// Guards call admission for one backend target.
pub struct CircuitBreaker {
    target: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(target: impl Into<String>, config: BreakerConfig) -> Self {
        let now = Instant::now();
        Self {
            target: target.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                window_started: now,
                last_transition: now,
                open_duration: config.open_duration,
                probe_in_flight: false,
            }),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Routes transition events to a sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the target identifier.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the current state without triggering transitions.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns the failures counted in the current window.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Returns a diagnostic snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            target: self.target.clone(),
            state: inner.state,
            failures: inner.failures,
            open_duration: inner.open_duration,
            since_transition: inner.last_transition.elapsed(),
        }
    }

    /// Asks to admit one call.
    ///
    /// Returns a permit that must be used to record the call's outcome, or
    /// the circuit-open failure.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, Failure> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let state = inner.state;

        match state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false)),
            CircuitState::Open if now.duration_since(inner.last_transition) >= inner.open_duration => {
                let event = self.transition(&mut inner, CircuitState::HalfOpen, now);
                inner.probe_in_flight = true;
                drop(inner);
                debug!(target_id = %self.target, "Admitting half-open probe");
                self.emit(event);
                Ok(BreakerPermit::new(self, true))
            }
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(BreakerPermit::new(self, true))
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                debug!(target_id = %self.target, state = %state, "Rejecting call");
                Err(Failure::circuit_open(&self.target))
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        let event = match (inner.state, probe) {
            (CircuitState::HalfOpen, true) => Some(self.close(&mut inner)),
            (CircuitState::Closed, false) => {
                inner.failures = 0;
                None
            }
            _ => None,
        };
        drop(inner);
        self.emit(event);
    }

    fn on_failure(&self, failure: &Failure, probe: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let event = match (inner.state, probe) {
            // the backend answered, even if the request was bad
            (CircuitState::HalfOpen, true) if !failure.is_retryable() => Some(self.close(&mut inner)),
            (CircuitState::HalfOpen, true) => {
                inner.open_duration = inner
                    .open_duration
                    .saturating_mul(2)
                    .min(self.config.max_open_duration);
                Some(self.open(&mut inner, now, failure))
            }
            (CircuitState::Closed, false) if failure.is_retryable() => {
                if inner.failures == 0
                    || now.duration_since(inner.window_started) > self.config.failure_window
                {
                    inner.failures = 0;
                    inner.window_started = now;
                }
                inner.failures += 1;
                debug!(
                    target_id = %self.target,
                    failures = inner.failures,
                    threshold = self.config.failure_threshold,
                    "Counted retryable failure"
                );
                (inner.failures >= self.config.failure_threshold.max(1))
                    .then(|| self.open(&mut inner, now, failure))
            }
            _ => None,
        };
        drop(inner);
        self.emit(event);
    }

    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant, failure: &Failure) -> BreakerEvent {
        let _ = self.transition(inner, CircuitState::Open, now);
        warn!(
            target_id = %self.target,
            failures = inner.failures,
            open_ms = inner.open_duration.as_millis() as u64,
            error = %failure,
            "Circuit opened"
        );
        BreakerEvent {
            name: "circuit.opened",
            data: serde_json::json!({
                "target": self.target,
                "failures": inner.failures,
                "open_ms": inner.open_duration.as_millis() as u64,
            }),
        }
    }

    fn close(&self, inner: &mut BreakerInner) -> BreakerEvent {
        let _ = self.transition(inner, CircuitState::Closed, Instant::now());
        inner.failures = 0;
        inner.open_duration = self.config.open_duration;
        info!(target_id = %self.target, "Circuit closed");
        BreakerEvent {
            name: "circuit.closed",
            data: serde_json::json!({ "target": self.target }),
        }
    }

    /// Moves to `to`; only the half-open transition carries its own event.
    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, now: Instant) -> Option<BreakerEvent> {
        inner.state = to;
        inner.last_transition = now;
        inner.probe_in_flight = false;
        (to == CircuitState::HalfOpen).then(|| BreakerEvent {
            name: "circuit.half_opened",
            data: serde_json::json!({ "target": self.target }),
        })
    }

    /// Sinks run outside the breaker lock and may call back into it.
    fn emit(&self, event: Option<BreakerEvent>) {
        if let Some(event) = event {
            self.sink.try_emit(event.name, Some(event.data));
        }
    }
}

/// A transition event collected under the lock and emitted after it.
struct BreakerEvent {
    name: &'static str,
    data: serde_json::Value,
}

/// Admission granted by a [`CircuitBreaker`].
///
/// Dropping a permit without recording an outcome (a cancelled call)
/// frees the probe slot without changing the circuit's state.
#[derive(Debug)]
#[must_use = "record the call's outcome on the permit"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    recorded: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            recorded: false,
        }
    }

    /// Returns true if this permit is the half-open probe.
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Records the outcome of the admitted call.
    pub fn record<T>(mut self, outcome: &Outcome<T>) {
        self.recorded = true;
        match outcome {
            Ok(_) => self.breaker.on_success(self.probe),
            Err(failure) => self.breaker.on_failure(failure, self.probe),
        }
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// The breakers owned by one client, keyed by target identifier.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("config", &self.config)
            .field("targets", &self.breakers.len())
            .finish()
    }
}

impl BreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Routes transition events of every breaker to a sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the breaker for a target, creating it closed on first use.
    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                Arc::new(
                    CircuitBreaker::new(target, self.config).with_event_sink(self.sink.clone()),
                )
            })
            .clone()
    }

    /// Returns snapshots of all known targets.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }
}
