//! Shared setup for integration tests.

#![allow(dead_code, clippy::expect_used)]

use std::sync::Arc;

use workbridge::prelude::*;
use workbridge::testing::InMemoryBackend;

/// A policy with short waits so paused-clock tests stay readable.
pub fn fast_policy() -> ClientPolicy {
    ClientPolicy {
        base_delay_ms: 10,
        max_delay_ms: 100,
        ..ClientPolicy::default()
    }
}

pub fn backend(kind: Backend) -> Arc<InMemoryBackend> {
    let project = match kind {
        Backend::AzureDevops => "Web",
        Backend::GitHub => "octo/app",
        Backend::Jira => "PROJ",
    };
    Arc::new(InMemoryBackend::new(kind, project))
}

pub fn client_with(
    backend: &Arc<InMemoryBackend>,
    policy: ClientPolicy,
    sink: Arc<dyn EventSink>,
) -> WorkItemClient {
    WorkItemClient::builder(backend.target())
        .credentials(Credential::new("test-token"))
        .transport(backend.clone())
        .policy(policy)
        .event_sink(sink)
        .backoff_seed(7)
        .build()
        .expect("valid client")
}

pub fn client(backend: &Arc<InMemoryBackend>) -> WorkItemClient {
    client_with(backend, fast_policy(), Arc::new(NoOpEventSink))
}

/// A GitHub issue document as the API returns it.
pub fn github_issue(number: u64, state: &str) -> serde_json::Value {
    serde_json::json!({
        "number": number,
        "title": format!("Issue {number}"),
        "state": state,
        "labels": [],
        "assignee": null,
        "updated_at": "2024-01-01T00:00:00Z",
    })
}
