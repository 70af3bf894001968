//! Sinks for client lifecycle events.
//!
//! The client emits a small vocabulary of events:
//!
//! | Event                 | Emitted when                                  |
//! |-----------------------|-----------------------------------------------|
//! | `retry.scheduled`     | a retryable failure is followed by a wait     |
//! | `retry.exhausted`     | attempts or elapsed budget ran out            |
//! | `circuit.opened`      | a breaker trips or a probe fails              |
//! | `circuit.half_opened` | a breaker admits its probe                    |
//! | `circuit.closed`      | a probe succeeds                              |
//! | `idempotency.replayed`| a create is answered from the dedup cache     |

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receives client lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting. Must never panic.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `DEBUG`.
    #[must_use]
    pub fn debug() -> Self {
        Self { level: Level::DEBUG }
    }

    /// Creates a sink logging at `INFO`.
    #[must_use]
    pub fn info() -> Self {
        Self::default()
    }

    fn log(&self, event_type: &str, data: &Option<Value>) {
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, event_data = ?data, "Client event");
        } else {
            info!(event_type = %event_type, event_data = ?data, "Client event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, &data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, &data);
    }
}

/// Records events in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Returns the payloads of events with the given type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<Option<Value>> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Counts events with the given type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events.read().iter().filter(|(t, _)| t == event_type).count()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all recorded events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}
