//! Retry, classification and circuit breaking through the public client.

mod common;

use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use common::{backend, client, client_with, fast_policy, github_issue};
use workbridge::prelude::*;
use workbridge::testing::{
    assert_cancelled, assert_circuit_open, assert_failure_kind, assert_success, Fault,
};
use workbridge::transport::{ResponseEnvelope, TransportFailureKind};

fn seeded_github() -> Arc<workbridge::testing::InMemoryBackend> {
    let backend = backend(Backend::GitHub);
    backend.insert_native(github_issue(1, "open"));
    backend
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_then_success() {
    let cases = [
        (Fault::status(503), ErrorKind::ServerFault),
        (Fault::status(429), ErrorKind::RateLimited),
        (Fault::Fail(TransportFailureKind::Connect), ErrorKind::Network),
        (Fault::Fail(TransportFailureKind::Timeout), ErrorKind::Timeout),
    ];

    for (fault, kind) in cases {
        let backend = seeded_github();
        backend.inject_repeated(&fault, 3);
        let client = client(&backend);

        let item = assert_success(client.get_work_item("1").await);
        assert_eq!(item.id(), "1", "{kind}");
        assert_eq!(backend.call_count(), 4, "{kind}: three failures and one success");
    }
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failures_make_one_call() {
    let cases = [
        (401, ErrorKind::AuthFailed),
        (403, ErrorKind::AuthFailed),
        (404, ErrorKind::NotFound),
        (409, ErrorKind::Conflict),
        (412, ErrorKind::Conflict),
        (400, ErrorKind::ValidationFailed),
        (422, ErrorKind::ValidationFailed),
        (418, ErrorKind::Unknown),
    ];

    for (status, kind) in cases {
        let backend = seeded_github();
        backend.inject(Fault::status(status));
        let client = client(&backend);

        let outcome = client.get_work_item("1").await;
        assert_failure_kind(&outcome, kind);
        assert_eq!(backend.call_count(), 1, "HTTP {status}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_server_faults_then_success_within_three_attempts() {
    let backend = seeded_github();
    backend.inject_repeated(&Fault::status(503), 2);
    let sink = Arc::new(CollectingEventSink::new());
    let policy = ClientPolicy {
        max_attempts: 3,
        ..fast_policy()
    };
    let client = client_with(&backend, policy, sink.clone());

    assert_success(client.get_work_item("1").await);

    assert_eq!(backend.call_count(), 3);
    assert_eq!(sink.count("retry.scheduled"), 2);
    assert_eq!(sink.count("retry.exhausted"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_exhausted_returns_last_failure() {
    let backend = seeded_github();
    backend.inject_repeated(&Fault::status(502), 10);
    let sink = Arc::new(CollectingEventSink::new());
    let policy = ClientPolicy {
        max_attempts: 3,
        failure_threshold: 10,
        ..fast_policy()
    };
    let client = client_with(&backend, policy, sink.clone());

    let outcome = client.get_work_item("1").await;

    assert_failure_kind(&outcome, ErrorKind::ServerFault);
    assert_eq!(backend.call_count(), 3);
    assert_eq!(sink.count("retry.exhausted"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_is_a_floor() {
    let backend = seeded_github();
    backend.inject(Fault::Respond(
        ResponseEnvelope::new(429, Value::Null).with_header("Retry-After", "2"),
    ));
    let client = client(&backend);

    let started = Instant::now();
    assert_success(client.get_work_item("1").await);

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_github_primary_rate_limit_is_retried() {
    let backend = seeded_github();
    backend.inject(Fault::Respond(
        ResponseEnvelope::new(403, serde_json::json!({"message": "API rate limit exceeded"}))
            .with_header("x-ratelimit-remaining", "0"),
    ));
    let client = client(&backend);

    assert_success(client.get_work_item("1").await);
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_half_opens() {
    let backend = seeded_github();
    backend.inject_repeated(&Fault::Fail(TransportFailureKind::Connect), 5);
    let sink = Arc::new(CollectingEventSink::new());
    let policy = ClientPolicy {
        max_attempts: 5,
        failure_threshold: 5,
        open_duration_ms: 1_000,
        ..fast_policy()
    };
    let client = client_with(&backend, policy, sink.clone());

    let first = client.get_work_item("1").await;
    assert_failure_kind(&first, ErrorKind::Network);
    assert_eq!(backend.call_count(), 5);
    assert_eq!(client.breaker_snapshot().state, CircuitState::Open);
    assert_eq!(sink.count("circuit.opened"), 1);

    let rejected = client.get_work_item("1").await;
    assert_circuit_open(&rejected);
    assert_eq!(rejected.unwrap_err().kind(), ErrorKind::ServerFault);
    assert_eq!(backend.call_count(), 5, "an open circuit never reaches the transport");

    tokio::time::advance(Duration::from_millis(1_001)).await;

    assert_success(client.get_work_item("1").await);
    let snapshot = client.breaker_snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failures, 0);
    assert_eq!(sink.count("circuit.half_opened"), 1);
    assert_eq!(sink.count("circuit.closed"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failures_leave_breaker_closed() {
    let backend = seeded_github();
    let policy = ClientPolicy {
        failure_threshold: 2,
        ..fast_policy()
    };
    let client = client_with(&backend, policy, Arc::new(NoOpEventSink));

    for _ in 0..5 {
        assert_failure_kind(&client.get_work_item("404").await, ErrorKind::NotFound);
    }

    assert_eq!(client.breaker_snapshot().state, CircuitState::Closed);
    assert_eq!(client.breaker_snapshot().failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_clients_can_share_breakers() {
    let backend = seeded_github();
    backend.inject_repeated(&Fault::status(503), 2);
    let policy = ClientPolicy {
        max_attempts: 1,
        failure_threshold: 2,
        ..fast_policy()
    };
    let registry = Arc::new(workbridge::resilience::BreakerRegistry::new(policy.breaker_config()));
    let build = || {
        WorkItemClient::builder(backend.target())
            .credentials(Credential::new("t"))
            .transport(backend.clone())
            .policy(policy)
            .breakers(registry.clone())
            .build()
            .expect("valid client")
    };
    let (first, second) = (build(), build());

    assert_failure_kind(&first.get_work_item("1").await, ErrorKind::ServerFault);
    assert_failure_kind(&second.get_work_item("1").await, ErrorKind::ServerFault);

    assert_circuit_open(&first.get_work_item("1").await);
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_makes_no_call() {
    let backend = seeded_github();
    let client = client(&backend);
    let token = CancellationToken::new();
    token.cancel("shutdown");

    let outcome = client.get_work_item_with_cancel("1", &token).await;

    assert_cancelled(&outcome);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff() {
    let backend = seeded_github();
    backend.inject(Fault::status(503));
    let policy = ClientPolicy {
        base_delay_ms: 5_000,
        max_delay_ms: 10_000,
        ..ClientPolicy::default()
    };
    let client = client_with(&backend, policy, Arc::new(NoOpEventSink));
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel("shutdown");
    });

    let started = Instant::now();
    let outcome = client.get_work_item_with_cancel("1", &token).await;

    assert_cancelled(&outcome);
    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Unknown);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(backend.call_count(), 1);
}
