//! Native request building for create, update and get.
//!
//! | Backend      | Create                          | Update                             | Version check |
//! |--------------|---------------------------------|------------------------------------|---------------|
//! | Azure DevOps | `POST …/workitems/$Type` (JSON-Patch) | `PATCH …/workitems/{id}` (JSON-Patch) | `test /rev` op |
//! | GitHub       | `POST /repos/{repo}/issues`     | `PATCH /repos/{repo}/issues/{n}`   | read, then `If-Match` |
//! | Jira         | `POST /rest/api/3/issue`        | `PUT /rest/api/3/issue/{key}`      | read, then `If-Match` |
//!
//! GitHub and Jira ignore `If-Match`, so the client compares versions with a
//! read before writing. Every create carries the key's marker (see
//! [`super::marker`]). Jira status cannot be written as a field; a status
//! change becomes a follow-up transition.

use serde_json::{json, Map, Value};

use super::mapping::PlatformMapping;
use super::marker::{key_marker, mark_draft};
use super::translate::{draft_changes, encode_id, patch_changes, set_pointer, NativeChange};
use crate::core::{ErrorKind, Failure, Outcome};
use crate::model::{Backend, BackendTarget, WorkItemDraft, WorkItemPatch};
use crate::transport::{Method, TransportRequest};

/// Azure DevOps REST API version.
pub const AZURE_API_VERSION: &str = "7.1";

/// Header carrying the caller's idempotency key on create.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const JSON_PATCH: &str = "application/json-patch+json";

/// A write request plus the Jira status transition that must follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    /// The request to send.
    pub request: TransportRequest,
    /// Native status to transition to afterwards (Jira only).
    pub transition: Option<String>,
}

/// Builds the create request for a draft, marked with the key's marker.
pub fn create(target: &BackendTarget, draft: &WorkItemDraft, key: &str) -> Outcome<WritePlan> {
    let mapping = PlatformMapping::of(target.backend);
    let marked = mark_draft(draft, target.backend, &key_marker(key));
    let changes = draft_changes(&marked, target.backend)?;

    let plan = match target.backend {
        Backend::AzureDevops => {
            let native_type = mapping.native_type(draft.item_type).unwrap_or_default();
            let ops: Vec<Value> = changes
                .iter()
                .filter(|c| c.pointer != mapping.item_type && !c.value.is_null())
                .map(|c| json!({"op": "add", "path": c.pointer, "value": c.value}))
                .collect();
            WritePlan {
                request: TransportRequest::new(
                    Method::Post,
                    format!("/{}/_apis/wit/workitems/${native_type}", project(target)?),
                )
                .with_query("api-version", AZURE_API_VERSION)
                .with_content_type(JSON_PATCH)
                .with_body(Value::Array(ops)),
                transition: None,
            }
        }
        Backend::GitHub => WritePlan {
            request: TransportRequest::new(Method::Post, format!("/repos/{}/issues", project(target)?))
                .with_body(github_body(&changes)),
            transition: None,
        },
        Backend::Jira => {
            let (mut body, transition) = jira_body(mapping, &changes);
            set_pointer(&mut body, "/fields/project/key", Value::from(project(target)?));
            WritePlan {
                request: TransportRequest::new(Method::Post, "/rest/api/3/issue").with_body(body),
                transition,
            }
        }
    };

    Ok(WritePlan {
        request: plan.request.with_header(IDEMPOTENCY_HEADER, key),
        ..plan
    })
}

/// Builds the update request for a patch, carrying `expected_version`.
pub fn update(
    target: &BackendTarget,
    id: &str,
    patch: &WorkItemPatch,
    expected_version: &str,
) -> Outcome<WritePlan> {
    let mapping = PlatformMapping::of(target.backend);
    let changes = patch_changes(patch, target.backend)?;

    match target.backend {
        Backend::AzureDevops => {
            let mut ops = vec![json!({
                "op": "test",
                "path": mapping.version.pointer,
                "value": encode_id(mapping.version, expected_version),
            })];
            ops.extend(changes.iter().map(|c| {
                if c.value.is_null() {
                    json!({"op": "remove", "path": c.pointer})
                } else {
                    json!({"op": "add", "path": c.pointer, "value": c.value})
                }
            }));
            Ok(WritePlan {
                request: TransportRequest::new(Method::Patch, item_path(target, id)?)
                    .with_query("api-version", AZURE_API_VERSION)
                    .with_content_type(JSON_PATCH)
                    .with_body(Value::Array(ops)),
                transition: None,
            })
        }
        Backend::GitHub => Ok(WritePlan {
            request: TransportRequest::new(Method::Patch, item_path(target, id)?)
                .with_header("If-Match", expected_version)
                .with_body(github_body(&changes)),
            transition: None,
        }),
        Backend::Jira => {
            let (mut body, transition) = jira_body(mapping, &changes);
            if body.get("fields").is_none() {
                set_pointer(&mut body, "/fields", Value::Object(Map::new()));
            }
            Ok(WritePlan {
                request: TransportRequest::new(Method::Put, item_path(target, id)?)
                    .with_header("If-Match", expected_version)
                    .with_body(body),
                transition,
            })
        }
    }
}

/// Builds the request that reads one item.
pub fn get(target: &BackendTarget, id: &str) -> Outcome<TransportRequest> {
    let request = TransportRequest::get(item_path(target, id)?);
    Ok(match target.backend {
        Backend::AzureDevops => request.with_query("api-version", AZURE_API_VERSION),
        Backend::GitHub | Backend::Jira => request,
    })
}

/// Lists the Jira transitions available from an issue's current status.
pub fn jira_transitions(target: &BackendTarget, id: &str) -> Outcome<TransportRequest> {
    Ok(TransportRequest::get(format!("{}/transitions", item_path(target, id)?)))
}

/// Applies a Jira transition by id.
pub fn jira_transition(
    target: &BackendTarget,
    id: &str,
    transition_id: &str,
) -> Outcome<TransportRequest> {
    Ok(
        TransportRequest::new(Method::Post, format!("{}/transitions", item_path(target, id)?))
            .with_body(json!({"transition": {"id": transition_id}})),
    )
}

/// Picks the transition leading to `status` from a Jira transitions listing.
pub fn find_transition(listing: &Value, status: &str) -> Option<String> {
    listing
        .get("transitions")?
        .as_array()?
        .iter()
        .find(|t| {
            t.pointer("/to/name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case(status))
        })
        .and_then(|t| match t.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
}

fn item_path(target: &BackendTarget, id: &str) -> Outcome<String> {
    if id.trim().is_empty() {
        return Err(Failure::local(ErrorKind::ValidationFailed, "work item id is empty"));
    }
    Ok(match target.backend {
        Backend::AzureDevops => format!("/{}/_apis/wit/workitems/{id}", project(target)?),
        Backend::GitHub => format!("/repos/{}/issues/{id}", project(target)?),
        Backend::Jira => format!("/rest/api/3/issue/{id}"),
    })
}

pub(crate) fn project(target: &BackendTarget) -> Outcome<&str> {
    target
        .project
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| {
            Failure::local(
                ErrorKind::ValidationFailed,
                format!("{} target needs a project", target.backend),
            )
        })
}

/// GitHub takes scalar `assignee`, `type` and `parent` where it returns objects.
fn github_body(changes: &[NativeChange]) -> Value {
    let mut body = Value::Object(Map::new());
    for change in changes {
        let pointer = match change.pointer.as_str() {
            "/assignee/login" => "/assignee",
            "/type/name" => "/type",
            "/parent/number" => "/parent",
            other => other,
        };
        set_pointer(&mut body, pointer, change.value.clone());
    }
    body
}

fn jira_body(mapping: &PlatformMapping, changes: &[NativeChange]) -> (Value, Option<String>) {
    let mut body = Value::Object(Map::new());
    let mut transition = None;
    for change in changes {
        if change.pointer == mapping.state {
            transition = change.value.as_str().map(str::to_string);
        } else {
            set_pointer(&mut body, &change.pointer, change.value.clone());
        }
    }
    (body, transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fields, CanonicalState, CanonicalWorkItem, WorkItemType};
    use pretty_assertions::assert_eq;

    fn azure() -> BackendTarget {
        BackendTarget::new(Backend::AzureDevops, "https://dev.azure.com/org").with_project("Web")
    }

    fn github() -> BackendTarget {
        BackendTarget::new(Backend::GitHub, "https://api.github.com").with_project("octo/app")
    }

    fn jira() -> BackendTarget {
        BackendTarget::new(Backend::Jira, "https://acme.atlassian.net").with_project("PROJ")
    }

    #[test]
    fn test_azure_create_is_json_patch() {
        let draft = WorkItemDraft::new(WorkItemType::Bug, "Crash").with_field(fields::PRIORITY, 2);
        let plan = create(&azure(), &draft, "key-1").unwrap();
        let request = plan.request;

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/Web/_apis/wit/workitems/$Bug");
        assert_eq!(request.query_param("api-version"), Some("7.1"));
        assert_eq!(request.content_type.as_deref(), Some(JSON_PATCH));
        assert_eq!(request.header(IDEMPOTENCY_HEADER), Some("key-1"));
        assert_eq!(
            request.body,
            Some(json!([
                {"op": "add", "path": "/fields/System.Title", "value": "Crash"},
                {"op": "add", "path": "/fields/System.Tags", "value": key_marker("key-1")},
                {"op": "add", "path": "/fields/Microsoft.VSTS.Common.Priority", "value": 2}
            ]))
        );
    }

    #[test]
    fn test_azure_update_tests_revision_first() {
        let patch = WorkItemPatch::new()
            .with_state(CanonicalState::Closed)
            .clear_field(fields::ASSIGNEE);
        let plan = update(&azure(), "42", &patch, "3").unwrap();

        assert_eq!(plan.request.method, Method::Patch);
        assert_eq!(plan.request.path, "/Web/_apis/wit/workitems/42");
        assert_eq!(
            plan.request.body,
            Some(json!([
                {"op": "test", "path": "/rev", "value": 3},
                {"op": "add", "path": "/fields/System.State", "value": "Closed"},
                {"op": "remove", "path": "/fields/System.AssignedTo"}
            ]))
        );
    }

    #[test]
    fn test_github_create_flattens_objects() {
        let draft = WorkItemDraft::new(WorkItemType::Bug, "Typo")
            .with_field(fields::ASSIGNEE, "octocat")
            .with_field(fields::LABELS, json!(["docs"]));
        let request = create(&github(), &draft, "k").unwrap().request;

        assert_eq!(request.path, "/repos/octo/app/issues");
        assert_eq!(
            request.body,
            Some(json!({
                "title": "Typo",
                "type": "Bug",
                "assignee": "octocat",
                "body": format!("<!-- {} -->", key_marker("k")),
                "labels": ["docs"]
            }))
        );
    }

    #[test]
    fn test_github_update_sends_if_match() {
        let patch = WorkItemPatch::new().with_title("Renamed");
        let request = update(&github(), "7", &patch, "2024-01-01T00:00:00Z").unwrap().request;

        assert_eq!(request.header("if-match"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(request.body, Some(json!({"title": "Renamed"})));
    }

    #[test]
    fn test_jira_status_becomes_transition() {
        let draft = WorkItemDraft::new(WorkItemType::Feature, "Billing")
            .with_state(CanonicalState::Active);
        let plan = create(&jira(), &draft, "k").unwrap();

        assert_eq!(plan.transition.as_deref(), Some("In Progress"));
        assert_eq!(
            plan.request.body,
            Some(json!({"fields": {
                "summary": "Billing",
                "issuetype": {"name": "Epic"},
                "labels": [key_marker("k")],
                "project": {"key": "PROJ"}
            }}))
        );

        let close = WorkItemPatch::new().with_state(CanonicalState::Closed);
        let update_plan = update(&jira(), "PROJ-1", &close, "v").unwrap();
        assert_eq!(update_plan.request.method, Method::Put);
        assert_eq!(update_plan.request.body, Some(json!({"fields": {}})));
        assert_eq!(update_plan.transition.as_deref(), Some("Done"));
    }

    #[test]
    fn test_whole_item_update_sends_only_writable_fields() {
        let item = CanonicalWorkItem::new("PROJ-2", WorkItemType::Task, "Ship", "v3")
            .with_state(CanonicalState::New)
            .with_field(fields::PRIORITY, "Low")
            .with_overflow("created", "2024-01-01T00:00:00.000+0000")
            .with_overflow("creator", json!({"accountId": "a1"}))
            .with_overflow("votes", json!({"votes": 0}))
            .with_overflow("customfield_10020", json!([{"id": 4}]));
        let plan = update(&jira(), "PROJ-2", &WorkItemPatch::from_item(&item), "v3").unwrap();

        assert_eq!(
            plan.request.body,
            Some(json!({"fields": {
                "summary": "Ship",
                "priority": {"name": "Low"},
                "customfield_10020": [{"id": 4}]
            }}))
        );
        assert_eq!(plan.transition.as_deref(), Some("To Do"));
    }

    #[test]
    fn test_github_removed_writes_state_reason() {
        let patch = WorkItemPatch::new().with_state(CanonicalState::Removed);
        let request = update(&github(), "7", &patch, "v").unwrap().request;
        assert_eq!(request.body, Some(json!({"state": "closed", "state_reason": "not_planned"})));
    }

    #[test]
    fn test_missing_project_is_validation_failure() {
        let target = BackendTarget::new(Backend::GitHub, "https://api.github.com");
        let failure = get(&target, "1").unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::ValidationFailed);

        let jira_get = get(&BackendTarget::new(Backend::Jira, "https://x"), "P-1").unwrap();
        assert_eq!(jira_get.path, "/rest/api/3/issue/P-1");
    }

    #[test]
    fn test_find_transition() {
        let listing = json!({"transitions": [
            {"id": "11", "name": "Start", "to": {"name": "In Progress"}},
            {"id": 31, "name": "Finish", "to": {"name": "Done"}}
        ]});
        assert_eq!(find_transition(&listing, "in progress"), Some("11".to_string()));
        assert_eq!(find_transition(&listing, "Done"), Some("31".to_string()));
        assert_eq!(find_transition(&listing, "Won't Do"), None);
    }
}
