//! A transport that replays queued outcomes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::{
    Credential, RawOutcome, ResponseEnvelope, Transport, TransportFailure, TransportFailureKind,
    TransportRequest,
};

/// Returns queued outcomes in order and records every request.
///
/// When the queue runs dry the fallback outcome is returned, or an I/O
/// failure if none was set.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<RawOutcome>>,
    fallback: Mutex<Option<RawOutcome>>,
    requests: Mutex<Vec<TransportRequest>>,
    secrets: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    #[must_use]
    pub fn respond(self, response: ResponseEnvelope) -> Self {
        self.push(response.into());
        self
    }

    /// Queues a response with a status and empty body.
    #[must_use]
    pub fn status(self, status: u16) -> Self {
        self.respond(ResponseEnvelope::new(status, serde_json::Value::Null))
    }

    /// Queues a transport failure.
    #[must_use]
    pub fn fail(self, kind: TransportFailureKind) -> Self {
        self.push(TransportFailure::new(kind, format!("scripted {kind:?} failure")).into());
        self
    }

    /// Returns `outcome` whenever the queue is empty.
    #[must_use]
    pub fn otherwise(self, outcome: impl Into<RawOutcome>) -> Self {
        *self.fallback.lock() = Some(outcome.into());
        self
    }

    /// Waits before answering each request.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues an outcome on a shared transport.
    pub fn push(&self, outcome: RawOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests received, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// The secret presented with each request.
    #[must_use]
    pub fn secrets(&self) -> Vec<String> {
        self.secrets.lock().clone()
    }

    /// Outcomes still queued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn next_outcome(&self) -> RawOutcome {
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        self.fallback.lock().clone().unwrap_or_else(|| {
            TransportFailure::new(TransportFailureKind::Io, "no scripted outcome left").into()
        })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest, credential: &Credential) -> RawOutcome {
        self.requests.lock().push(request.clone());
        self.secrets.lock().push(credential.expose().to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome()
    }
}
