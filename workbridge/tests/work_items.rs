//! Create, read and update against every simulated backend.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use common::{backend, client, client_with, fast_policy};
use workbridge::prelude::*;
use workbridge::testing::{assert_failure_kind, assert_success, Fault, InMemoryBackend};
use workbridge::transport::Method;

fn creates(backend: &InMemoryBackend) -> usize {
    backend
        .requests()
        .iter()
        .filter(|r| r.header("idempotency-key").is_some())
        .count()
}

fn bug_draft() -> WorkItemDraft {
    WorkItemDraft::new(WorkItemType::Bug, "Crash on save")
        .with_field(fields::DESCRIPTION, "Saving a draft twice crashes the editor")
        .with_field(fields::LABELS, json!(["ui"]))
}

#[tokio::test(start_paused = true)]
async fn test_create_get_update_on_every_backend() {
    for kind in Backend::ALL {
        let backend = backend(kind);
        let client = client(&backend);

        let created = assert_success(
            client
                .create_work_item(&bug_draft(), &IdempotencyKey::generate())
                .await,
        );
        assert!(!created.id().is_empty(), "{kind}");
        assert!(!created.version_token().is_empty(), "{kind}");
        assert_eq!(created.item_type, WorkItemType::Bug, "{kind}");
        assert_eq!(created.state, CanonicalState::New, "{kind}");
        assert_eq!(created.field(fields::LABELS), Some(&json!(["ui"])), "{kind}");

        let fetched = assert_success(client.get_work_item(created.id()).await);
        assert_eq!(fetched, created, "{kind}");

        let patch = WorkItemPatch::new()
            .with_title("Crash on save (Safari)")
            .with_state(CanonicalState::Closed);
        let updated = assert_success(
            client
                .update_work_item(created.id(), &patch, created.version_token())
                .await,
        );
        assert_eq!(updated.id(), created.id(), "{kind}");
        assert_eq!(updated.title, "Crash on save (Safari)", "{kind}");
        assert_eq!(updated.state, CanonicalState::Closed, "{kind}");
        assert_eq!(updated.field(fields::LABELS), Some(&json!(["ui"])), "{kind}");
        assert_ne!(updated.version_token(), created.version_token(), "{kind}");
        assert_eq!(backend.len(), 1, "{kind}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_lost_create_response_returns_same_item() {
    for kind in Backend::ALL {
        let backend = backend(kind);
        backend.inject(Fault::DropResponse);
        let client = client(&backend);

        let item = assert_success(
            client
                .create_work_item(&bug_draft(), &IdempotencyKey::new("create-1"))
                .await,
        );

        assert_eq!(backend.len(), 1, "{kind}: the retry must not create a duplicate");
        assert_eq!(creates(backend.as_ref()), 1, "{kind}: the retry found the first create");
        assert_eq!(item.title, "Crash on save", "{kind}");
        assert_eq!(item.field(fields::LABELS), Some(&json!(["ui"])), "{kind}");
        let stored = assert_success(client.get_work_item(item.id()).await);
        assert_eq!(stored.id(), item.id(), "{kind}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_repeated_create_is_answered_locally() {
    let backend = backend(Backend::GitHub);
    let sink = Arc::new(CollectingEventSink::new());
    let client = client_with(&backend, fast_policy(), sink.clone());
    let key = IdempotencyKey::new("create-2");

    let first = assert_success(client.create_work_item(&bug_draft(), &key).await);
    let calls = backend.call_count();
    let second = assert_success(client.create_work_item(&bug_draft(), &key).await);

    assert_eq!(first, second);
    assert_eq!(backend.call_count(), calls);
    assert_eq!(sink.count("idempotency.replayed"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_key_reuse_with_other_payload_is_rejected() {
    let backend = backend(Backend::GitHub);
    let client = client(&backend);
    let key = IdempotencyKey::new("create-3");

    assert_success(client.create_work_item(&bug_draft(), &key).await);
    let calls = backend.call_count();

    let other = WorkItemDraft::new(WorkItemType::Task, "Something else");
    let outcome = client.create_work_item(&other, &key).await;

    assert_failure_kind(&outcome, ErrorKind::ValidationFailed);
    assert_eq!(backend.call_count(), calls);
    assert_eq!(backend.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_sends_idempotency_key_on_every_attempt() {
    let backend = backend(Backend::AzureDevops);
    backend.inject(Fault::status(503));
    let client = client(&backend);

    assert_success(
        client
            .create_work_item(&bug_draft(), &IdempotencyKey::new("create-4"))
            .await,
    );

    let keys: Vec<_> = backend
        .requests()
        .iter()
        .filter(|r| r.path.contains("/workitems/$"))
        .map(|r| r.header("idempotency-key").map(str::to_string))
        .collect();
    assert_eq!(keys, vec![Some("create-4".to_string()); 2]);
}

#[tokio::test(start_paused = true)]
async fn test_stale_version_is_a_conflict_after_one_call() {
    for kind in Backend::ALL {
        let backend = backend(kind);
        let client = client(&backend);
        let item = assert_success(
            client
                .create_work_item(&bug_draft(), &IdempotencyKey::generate())
                .await,
        );
        assert!(backend.touch(item.id()), "{kind}");
        let calls = backend.call_count();

        let patch = WorkItemPatch::new().with_title("Lost update");
        let outcome = client
            .update_work_item(item.id(), &patch, item.version_token())
            .await;

        assert_failure_kind(&outcome, ErrorKind::Conflict);
        assert!(!outcome.unwrap_err().is_retryable(), "{kind}");
        assert_eq!(backend.call_count(), calls + 1, "{kind}");
        let stored = assert_success(client.get_work_item(item.id()).await);
        assert_eq!(stored.title, "Crash on save", "{kind}: the stale write was not applied");
    }
}

#[tokio::test(start_paused = true)]
async fn test_github_closed_reasons_through_backend() {
    let backend = backend(Backend::GitHub);
    let client = client(&backend);
    let item = assert_success(
        client
            .create_work_item(&bug_draft(), &IdempotencyKey::generate())
            .await,
    );

    let patch = WorkItemPatch::new().with_state(CanonicalState::Removed);
    let removed = assert_success(
        client
            .update_work_item(item.id(), &patch, item.version_token())
            .await,
    );
    assert_eq!(removed.state, CanonicalState::Removed);
    let stored = backend.native(item.id()).unwrap();
    assert_eq!(stored["state"], "closed");
    assert_eq!(stored["state_reason"], "not_planned");

    let patch = WorkItemPatch::new().with_state(CanonicalState::Active);
    let reopened = assert_success(
        client
            .update_work_item(item.id(), &patch, removed.version_token())
            .await,
    );
    assert_eq!(reopened.state, CanonicalState::New, "GitHub has no in-progress state");
    assert_eq!(backend.native(item.id()).unwrap()["state"], "open");
}

#[tokio::test(start_paused = true)]
async fn test_whole_item_update_leaves_out_read_only_fields() {
    let backend = backend(Backend::GitHub);
    backend.insert_native(json!({
        "number": 3,
        "id": 99_001,
        "node_id": "I_kwDO",
        "html_url": "https://github.com/octo/app/issues/3",
        "user": {"login": "octocat"},
        "created_at": "2023-12-01T00:00:00Z",
        "comments": 4,
        "title": "Docs typo",
        "state": "open",
        "labels": [],
        "milestone": 2,
        "updated_at": "2024-01-01T00:00:00Z",
    }));
    let client = client(&backend);

    let mut item = assert_success(client.get_work_item("3").await);
    item.title = "Docs typo in README".to_string();
    let version = item.version_token().to_string();
    assert_success(client.update(&item, &version).await);

    let patch = backend
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Patch)
        .and_then(|r| r.body)
        .unwrap();
    assert_eq!(
        patch,
        json!({"title": "Docs typo in README", "state": "open", "labels": [], "milestone": 2})
    );
}

#[tokio::test(start_paused = true)]
async fn test_whole_item_update_keeps_unrecognized_state() {
    let backend = backend(Backend::AzureDevops);
    backend.insert_native(json!({
        "id": 12,
        "rev": 4,
        "fields": {
            "System.Title": "Migrate billing",
            "System.WorkItemType": "Task",
            "System.State": "Resolved",
            "Custom.Team": "payments",
        }
    }));
    let client = client(&backend);

    let mut item = assert_success(client.get_work_item("12").await);
    assert_eq!(item.state, CanonicalState::Unrecognized);
    assert_eq!(item.native_state(), Some("Resolved"));
    assert_eq!(item.overflow.get("Custom.Team"), Some(&json!("payments")));

    item.title = "Migrate billing to v2".to_string();
    let version = item.version_token().to_string();
    let updated = assert_success(client.update(&item, &version).await);

    assert_eq!(updated.title, "Migrate billing to v2");
    assert_eq!(updated.native_state(), Some("Resolved"));
    assert_eq!(updated.version_token(), "5");
    let stored = backend.native("12").unwrap();
    assert_eq!(stored["fields"]["System.State"], "Resolved");
    assert_eq!(stored["fields"]["Custom.Team"], "payments");
}

#[tokio::test(start_paused = true)]
async fn test_jira_state_changes_use_transitions() {
    let backend = backend(Backend::Jira);
    let client = client(&backend);

    let draft = bug_draft().with_state(CanonicalState::Active);
    let item = assert_success(client.create_work_item(&draft, &IdempotencyKey::generate()).await);
    assert_eq!(item.state, CanonicalState::Active);

    let transitions = |backend: &workbridge::testing::InMemoryBackend| {
        backend
            .requests()
            .iter()
            .filter(|r| r.method == Method::Post && r.path.ends_with("/transitions"))
            .count()
    };
    assert_eq!(transitions(backend.as_ref()), 1);

    let mut whole = item.clone();
    whole.title = "Crash on save, again".to_string();
    let updated = assert_success(client.update(&whole, item.version_token()).await);

    assert_eq!(updated.title, "Crash on save, again");
    assert_eq!(updated.state, CanonicalState::Active);
    assert_eq!(transitions(backend.as_ref()), 1, "an unchanged status needs no transition");
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_field_fails_before_any_call() {
    let backend = backend(Backend::GitHub);
    let client = client(&backend);

    let draft = WorkItemDraft::new(WorkItemType::Task, "Estimate").with_field(fields::STORY_POINTS, 3);
    let outcome = client.create_work_item(&draft, &IdempotencyKey::generate()).await;

    assert_failure_kind(&outcome, ErrorKind::ValidationFailed);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_item_is_not_found() {
    let backend = backend(Backend::Jira);
    let client = client(&backend);

    let outcome = client.get_work_item("PROJ-99").await;

    assert_failure_kind(&outcome, ErrorKind::NotFound);
    assert_eq!(backend.call_count(), 1);
}
