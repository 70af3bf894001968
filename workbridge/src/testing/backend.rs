//! A stateful backend simulator speaking the native protocols.
//!
//! [`InMemoryBackend`] implements [`Transport`] and answers the requests the
//! client builds for Azure DevOps, GitHub and Jira: creates, updates, reads,
//! Jira transitions and paged listings. Like the real services, only Azure
//! DevOps enforces a version check (its `test /rev` op) unless header checks
//! are switched on. Faults can be queued to exercise the resilience layer,
//! including a request that is applied but whose response is lost.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::adapters::{set_pointer, IDEMPOTENCY_HEADER};
use crate::model::{Backend, BackendTarget};
use crate::transport::{
    Credential, Method, RawOutcome, ResponseEnvelope, Transport, TransportFailure,
    TransportFailureKind, TransportRequest,
};

/// Base URL of every simulated target.
pub const SIMULATED_BASE_URL: &str = "https://backend.test";

const EPOCH_SECONDS: i64 = 1_704_067_200;

const JIRA_TRANSITIONS: [(&str, &str); 4] = [
    ("11", "To Do"),
    ("21", "In Progress"),
    ("31", "Done"),
    ("41", "Won't Do"),
];

/// A failure to inject ahead of normal processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Answer with this response without touching state.
    Respond(ResponseEnvelope),
    /// Fail at the transport level without touching state.
    Fail(TransportFailureKind),
    /// Apply the request, then lose the response.
    DropResponse,
}

impl Fault {
    /// A bare status response.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self::Respond(ResponseEnvelope::new(status, Value::Null))
    }
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<u64, Value>,
    next_id: u64,
    clock: i64,
    keys: HashMap<String, u64>,
    faults: VecDeque<Fault>,
    requests: Vec<TransportRequest>,
}

impl State {
    fn allocate(&mut self) -> u64 {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn tick(&mut self) -> String {
        self.clock += 1;
        DateTime::<Utc>::from_timestamp(EPOCH_SECONDS + self.clock, 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default()
    }
}

/// An in-memory backend for one project.
#[derive(Debug)]
pub struct InMemoryBackend {
    backend: Backend,
    project: String,
    header_checks: bool,
    state: Mutex<State>,
}

impl InMemoryBackend {
    /// Creates an empty backend. `project` is the Azure DevOps project,
    /// GitHub `owner/repo` or Jira project key.
    #[must_use]
    pub fn new(backend: Backend, project: impl Into<String>) -> Self {
        Self {
            backend,
            project: project.into(),
            header_checks: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Enforces `If-Match` on GitHub and Jira writes and answers a
    /// repeated `Idempotency-Key` with the original item. Off by default,
    /// as on the real services.
    #[must_use]
    pub fn with_header_checks(mut self, enabled: bool) -> Self {
        self.header_checks = enabled;
        self
    }

    /// The target a client should use to reach this backend.
    #[must_use]
    pub fn target(&self) -> BackendTarget {
        BackendTarget::new(self.backend, SIMULATED_BASE_URL).with_project(self.project.clone())
    }

    /// Queues a fault for the next request.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Queues the same fault `times` times.
    pub fn inject_repeated(&self, fault: &Fault, times: usize) {
        let mut state = self.state.lock();
        for _ in 0..times {
            state.faults.push_back(fault.clone());
        }
    }

    /// Stores a native document as-is and returns its canonical id.
    ///
    /// Returns `None` when the document has no usable id.
    pub fn insert_native(&self, doc: Value) -> Option<String> {
        let (n, id) = match self.backend {
            Backend::AzureDevops => {
                let n = doc.get("id")?.as_u64()?;
                (n, n.to_string())
            }
            Backend::GitHub => {
                let n = doc.get("number")?.as_u64()?;
                (n, n.to_string())
            }
            Backend::Jira => {
                let key = doc.get("key")?.as_str()?.to_string();
                (self.jira_number(&key)?, key)
            }
        };
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(n + 1);
        state.items.insert(n, doc);
        Some(id)
    }

    /// The stored native document for a canonical id.
    #[must_use]
    pub fn native(&self, id: &str) -> Option<Value> {
        let n = self.number(id)?;
        self.state.lock().items.get(&n).cloned()
    }

    /// Simulates another writer changing the item, which moves its version.
    pub fn touch(&self, id: &str) -> bool {
        let Some(n) = self.number(id) else {
            return false;
        };
        let mut state = self.state.lock();
        let stamp = state.tick();
        let backend = self.backend;
        match state.items.get_mut(&n) {
            Some(doc) => {
                bump_version(backend, doc, &stamp);
                true
            }
            None => false,
        }
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Requests received, oldest first, faulted ones included.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Number of requests received with `method`.
    #[must_use]
    pub fn calls_with(&self, method: Method) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn number(&self, id: &str) -> Option<u64> {
        match self.backend {
            Backend::AzureDevops | Backend::GitHub => id.parse().ok(),
            Backend::Jira => self.jira_number(id),
        }
    }

    fn jira_number(&self, key: &str) -> Option<u64> {
        let (project, n) = key.rsplit_once('-')?;
        (project == self.project).then(|| n.parse().ok()).flatten()
    }

    fn handle(&self, request: &TransportRequest) -> ResponseEnvelope {
        let mut state = self.state.lock();
        match self.backend {
            Backend::AzureDevops => self.azure(&mut state, request),
            Backend::GitHub => self.github(&mut state, request),
            Backend::Jira => self.jira(&mut state, request),
        }
    }

    fn replayed(&self, state: &State, request: &TransportRequest) -> Option<u64> {
        if !self.header_checks {
            return None;
        }
        let key = request.header(IDEMPOTENCY_HEADER)?;
        let n = *state.keys.get(key)?;
        state.items.contains_key(&n).then_some(n)
    }

    fn remember_key(&self, state: &mut State, request: &TransportRequest, n: u64) {
        if let Some(key) = request.header(IDEMPOTENCY_HEADER) {
            state.keys.insert(key.to_string(), n);
        }
    }

    fn azure(&self, state: &mut State, request: &TransportRequest) -> ResponseEnvelope {
        let prefix = format!("/{}/_apis/wit/", self.project);
        let Some(rest) = request.path.strip_prefix(&prefix) else {
            return not_found(self.backend, &request.path);
        };

        match (request.method, rest) {
            (Method::Post, "wiql") => {
                let wiql = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("query"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let tag = quoted_after(wiql, "[System.Tags] CONTAINS '", '\'');
                let ids: Vec<Value> = state
                    .items
                    .iter()
                    .filter(|(_, doc)| tag.map_or(true, |tag| has_tag(doc, tag)))
                    .map(|(n, _)| json!({"id": n}))
                    .collect();
                ok(json!({"queryType": "flat", "workItems": ids}))
            }
            (Method::Get, "workitems") => {
                let value: Vec<Value> = request
                    .query_param("ids")
                    .unwrap_or_default()
                    .split(',')
                    .filter_map(|id| id.trim().parse::<u64>().ok())
                    .filter_map(|n| state.items.get(&n).cloned())
                    .collect();
                ok(json!({"count": value.len(), "value": value}))
            }
            (Method::Post, rest) if rest.starts_with("workitems/$") => {
                if let Some(n) = self.replayed(state, request) {
                    return ok(state.items[&n].clone());
                }
                let Some(Value::Array(ops)) = &request.body else {
                    return bad_request(self.backend, "expected a JSON-Patch document");
                };
                let n = state.allocate();
                let stamp = state.tick();
                let mut doc = json!({
                    "id": n,
                    "rev": 1,
                    "fields": {
                        "System.TeamProject": self.project,
                        "System.WorkItemType": &rest["workitems/$".len()..],
                        "System.State": "New",
                        "System.ChangedDate": stamp,
                    }
                });
                if let Err(message) = apply_patch(&mut doc, ops) {
                    return bad_request(self.backend, &message);
                }
                state.items.insert(n, doc.clone());
                self.remember_key(state, request, n);
                ok(doc)
            }
            (method, rest) => {
                let Some(n) = rest.strip_prefix("workitems/").and_then(|id| id.parse::<u64>().ok())
                else {
                    return not_found(self.backend, &request.path);
                };
                let stamp = state.tick();
                let Some(doc) = state.items.get_mut(&n) else {
                    return not_found(self.backend, &request.path);
                };
                match method {
                    Method::Get => ok(doc.clone()),
                    Method::Patch => {
                        let Some(Value::Array(ops)) = &request.body else {
                            return bad_request(self.backend, "expected a JSON-Patch document");
                        };
                        let mut updated = doc.clone();
                        if let Err(message) = apply_patch(&mut updated, ops) {
                            return if message.starts_with("test") {
                                precondition_failed(self.backend, &message)
                            } else {
                                bad_request(self.backend, &message)
                            };
                        }
                        bump_version(self.backend, &mut updated, &stamp);
                        *doc = updated.clone();
                        ok(updated)
                    }
                    _ => not_found(self.backend, &request.path),
                }
            }
        }
    }

    fn github(&self, state: &mut State, request: &TransportRequest) -> ResponseEnvelope {
        let collection = format!("/repos/{}/issues", self.project);
        let Some(rest) = request.path.strip_prefix(&collection) else {
            return not_found(self.backend, &request.path);
        };

        match (request.method, rest) {
            (Method::Post, "") => {
                if let Some(n) = self.replayed(state, request) {
                    return created(state.items[&n].clone());
                }
                let n = state.allocate();
                let stamp = state.tick();
                let mut doc = json!({
                    "number": n,
                    "title": "",
                    "state": "open",
                    "labels": [],
                    "assignee": null,
                    "updated_at": stamp,
                });
                merge_github(&mut doc, request.body.as_ref());
                state.items.insert(n, doc.clone());
                self.remember_key(state, request, n);
                created(doc)
            }
            (Method::Get, "") => {
                let wanted = request.query_param("state").unwrap_or("open");
                let per_page = query_number(request, "per_page", 30).max(1);
                let page = query_number(request, "page", 1).max(1);
                let mut matching: Vec<&Value> = state
                    .items
                    .values()
                    .filter(|doc| match wanted {
                        "all" => true,
                        "closed" => doc["state"] == "closed",
                        _ => doc["state"] != "closed",
                    })
                    .collect();
                if request.query_param("direction") == Some("desc") {
                    matching.reverse();
                }
                let start = ((page - 1) * per_page) as usize;
                let body: Vec<Value> = matching
                    .iter()
                    .skip(start)
                    .take(per_page as usize)
                    .map(|doc| (*doc).clone())
                    .collect();
                let mut response = ok(Value::Array(body));
                if start + (per_page as usize) < matching.len() {
                    response = response.with_header(
                        "link",
                        format!(
                            "<{SIMULATED_BASE_URL}{collection}?state={wanted}&per_page={per_page}&page={}>; rel=\"next\"",
                            page + 1
                        ),
                    );
                }
                response
            }
            (method, rest) => {
                let Some(n) = rest.strip_prefix('/').and_then(|id| id.parse::<u64>().ok()) else {
                    return not_found(self.backend, &request.path);
                };
                let stamp = state.tick();
                let Some(doc) = state.items.get_mut(&n) else {
                    return not_found(self.backend, &request.path);
                };
                match method {
                    Method::Get => ok(doc.clone()),
                    Method::Patch => {
                        let expected = request.header("if-match").filter(|_| self.header_checks);
                        if let Some(expected) = expected {
                            if doc["updated_at"] != expected {
                                return precondition_failed(self.backend, "Precondition Failed");
                            }
                        }
                        let was_closed = doc["state"] == "closed";
                        merge_github(doc, request.body.as_ref());
                        settle_state_reason(doc, request.body.as_ref(), was_closed);
                        bump_version(self.backend, doc, &stamp);
                        ok(doc.clone())
                    }
                    _ => not_found(self.backend, &request.path),
                }
            }
        }
    }

    fn jira(&self, state: &mut State, request: &TransportRequest) -> ResponseEnvelope {
        let path = request.path.as_str();

        if path == "/rest/api/3/search" && request.method == Method::Get {
            let start_at = query_number(request, "startAt", 0);
            let max_results = query_number(request, "maxResults", 50).max(1);
            let label = request
                .query_param("jql")
                .and_then(|jql| quoted_after(jql, "labels = \"", '"'));
            let matching: Vec<&Value> = state
                .items
                .values()
                .filter(|doc| label.map_or(true, |label| has_label(doc, label)))
                .collect();
            let issues: Vec<Value> = matching
                .iter()
                .skip(start_at as usize)
                .take(max_results as usize)
                .map(|doc| (*doc).clone())
                .collect();
            return ok(json!({
                "startAt": start_at,
                "maxResults": max_results,
                "total": matching.len(),
                "issues": issues,
            }));
        }

        if path == "/rest/api/3/issue" && request.method == Method::Post {
            if let Some(n) = self.replayed(state, request) {
                return created(self.jira_stub(n));
            }
            let Some(fields) = request.body.as_ref().and_then(|b| b.get("fields")) else {
                return bad_request(self.backend, "fields are required");
            };
            if fields.pointer("/summary").and_then(Value::as_str).is_none() {
                return bad_request(self.backend, "summary: Field 'summary' is required");
            }
            let n = state.allocate();
            let stamp = state.tick();
            let mut doc = json!({
                "id": (10_000 + n).to_string(),
                "key": format!("{}-{n}", self.project),
                "fields": {"status": {"name": "To Do"}, "updated": stamp},
            });
            merge_jira(&mut doc, fields);
            state.items.insert(n, doc);
            self.remember_key(state, request, n);
            return created(self.jira_stub(n));
        }

        let Some(rest) = path.strip_prefix("/rest/api/3/issue/") else {
            return not_found(self.backend, path);
        };
        let (key, transitions) = match rest.strip_suffix("/transitions") {
            Some(key) => (key, true),
            None => (rest, false),
        };
        let Some(n) = self.jira_number(key) else {
            return not_found(self.backend, path);
        };
        let stamp = state.tick();
        let Some(doc) = state.items.get_mut(&n) else {
            return not_found(self.backend, path);
        };

        match (request.method, transitions) {
            (Method::Get, false) => ok(doc.clone()),
            (Method::Put, false) => {
                let expected = request.header("if-match").filter(|_| self.header_checks);
                if let Some(expected) = expected {
                    if doc.pointer("/fields/updated").and_then(Value::as_str) != Some(expected) {
                        return precondition_failed(self.backend, "The issue was modified");
                    }
                }
                if let Some(fields) = request.body.as_ref().and_then(|b| b.get("fields")) {
                    merge_jira(doc, fields);
                }
                bump_version(self.backend, doc, &stamp);
                no_content()
            }
            (Method::Get, true) => {
                let current = doc.pointer("/fields/status/name").and_then(Value::as_str);
                let available: Vec<Value> = JIRA_TRANSITIONS
                    .iter()
                    .filter(|(_, name)| Some(*name) != current)
                    .map(|(id, name)| json!({"id": id, "name": name, "to": {"name": name}}))
                    .collect();
                ok(json!({"transitions": available}))
            }
            (Method::Post, true) => {
                let wanted = request
                    .body
                    .as_ref()
                    .and_then(|b| b.pointer("/transition/id"))
                    .and_then(Value::as_str);
                let Some((_, status)) = JIRA_TRANSITIONS.iter().find(|(id, _)| Some(*id) == wanted)
                else {
                    return bad_request(self.backend, "transition is not valid");
                };
                set_pointer(doc, "/fields/status/name", Value::from(*status));
                bump_version(self.backend, doc, &stamp);
                no_content()
            }
            _ => not_found(self.backend, path),
        }
    }

    fn jira_stub(&self, n: u64) -> Value {
        json!({
            "id": (10_000 + n).to_string(),
            "key": format!("{}-{n}", self.project),
            "self": format!("{SIMULATED_BASE_URL}/rest/api/3/issue/{}", 10_000 + n),
        })
    }
}

#[async_trait]
impl Transport for InMemoryBackend {
    async fn send(&self, request: &TransportRequest, _credential: &Credential) -> RawOutcome {
        let fault = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.faults.pop_front()
        };

        match fault {
            Some(Fault::Respond(response)) => response.into(),
            Some(Fault::Fail(kind)) => {
                TransportFailure::new(kind, format!("injected {kind:?} failure")).into()
            }
            Some(Fault::DropResponse) => {
                let _ = self.handle(request);
                TransportFailure::new(TransportFailureKind::Timeout, "response lost after processing")
                    .into()
            }
            None => self.handle(request).into(),
        }
    }
}

fn bump_version(backend: Backend, doc: &mut Value, stamp: &str) {
    match backend {
        Backend::AzureDevops => {
            let rev = doc.get("rev").and_then(Value::as_u64).unwrap_or(0);
            set_pointer(doc, "/rev", Value::from(rev + 1));
            set_pointer(doc, "/fields/System.ChangedDate", Value::from(stamp));
        }
        Backend::GitHub => set_pointer(doc, "/updated_at", Value::from(stamp)),
        Backend::Jira => set_pointer(doc, "/fields/updated", Value::from(stamp)),
    }
}

/// Applies JSON-Patch `add`, `replace`, `remove` and `test` operations.
fn apply_patch(doc: &mut Value, ops: &[Value]) -> Result<(), String> {
    for op in ops {
        let path = op.get("path").and_then(Value::as_str).unwrap_or_default();
        match op.get("op").and_then(Value::as_str) {
            Some("test") => {
                let expected = op.get("value").unwrap_or(&Value::Null);
                if doc.pointer(path) != Some(expected) {
                    return Err(format!("test operation failed for {path}"));
                }
            }
            Some("add" | "replace") => {
                set_pointer(doc, path, op.get("value").cloned().unwrap_or(Value::Null));
            }
            Some("remove") => remove_pointer(doc, path),
            other => return Err(format!("unsupported operation {other:?}")),
        }
    }
    Ok(())
}

fn remove_pointer(doc: &mut Value, pointer: &str) {
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return;
    };
    let key = last.replace("~1", "/").replace("~0", "~");
    if let Some(Value::Object(map)) = doc.pointer_mut(parent) {
        map.remove(&key);
    }
}

/// GitHub takes scalars where it returns objects.
fn merge_github(doc: &mut Value, body: Option<&Value>) {
    let Some(Value::Object(body)) = body else {
        return;
    };
    for (key, value) in body {
        let stored = match (key.as_str(), value) {
            (_, Value::Null) => Value::Null,
            ("assignee", login) => json!({"login": login}),
            ("type", name) => json!({"name": name}),
            ("parent", number) => json!({"number": number}),
            ("labels", Value::Array(labels)) => labels
                .iter()
                .map(|label| match label {
                    Value::String(name) => json!({"name": name}),
                    other => other.clone(),
                })
                .collect(),
            (_, other) => other.clone(),
        };
        set_pointer(doc, &format!("/{key}"), stored);
    }
}

/// Closing without a reason completes the issue; reopening marks it reopened.
fn settle_state_reason(doc: &mut Value, body: Option<&Value>, was_closed: bool) {
    let Some(state) = body.and_then(|b| b.get("state")).and_then(Value::as_str) else {
        return;
    };
    let explicit = body.and_then(|b| b.get("state_reason")).is_some_and(|r| !r.is_null());
    match state {
        "closed" if !explicit => set_pointer(doc, "/state_reason", Value::from("completed")),
        "open" if was_closed => set_pointer(doc, "/state_reason", Value::from("reopened")),
        _ => {}
    }
}

fn merge_jira(doc: &mut Value, fields: &Value) {
    let Some(fields) = fields.as_object() else {
        return;
    };
    let Some(Value::Object(stored)) = doc.get_mut("fields") else {
        return;
    };
    for (key, value) in fields {
        if value.is_null() {
            stored.remove(key);
        } else {
            stored.insert(key.clone(), value.clone());
        }
    }
}

/// The text between `prefix` and the next `close` in `query`.
fn quoted_after<'a>(query: &'a str, prefix: &str, close: char) -> Option<&'a str> {
    let start = query.find(prefix)? + prefix.len();
    let rest = &query[start..];
    rest.find(close).map(|end| &rest[..end])
}

fn has_tag(doc: &Value, tag: &str) -> bool {
    doc.pointer("/fields/System.Tags")
        .and_then(Value::as_str)
        .is_some_and(|tags| tags.split(';').any(|t| t.trim() == tag))
}

fn has_label(doc: &Value, label: &str) -> bool {
    doc.pointer("/fields/labels")
        .and_then(Value::as_array)
        .is_some_and(|labels| labels.iter().any(|l| l == label))
}

fn query_number(request: &TransportRequest, name: &str, default: u64) -> u64 {
    request
        .query_param(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn ok(body: Value) -> ResponseEnvelope {
    ResponseEnvelope::new(200, body)
}

fn created(body: Value) -> ResponseEnvelope {
    ResponseEnvelope::new(201, body)
}

fn no_content() -> ResponseEnvelope {
    ResponseEnvelope::new(204, Value::Null)
}

fn error(backend: Backend, status: u16, message: &str) -> ResponseEnvelope {
    let body = match backend {
        Backend::Jira => json!({"errorMessages": [message], "errors": Map::new()}),
        Backend::AzureDevops | Backend::GitHub => json!({"message": message}),
    };
    ResponseEnvelope::new(status, body)
}

fn not_found(backend: Backend, path: &str) -> ResponseEnvelope {
    error(backend, 404, &format!("{path} does not exist"))
}

fn bad_request(backend: Backend, message: &str) -> ResponseEnvelope {
    error(backend, 400, message)
}

fn precondition_failed(backend: Backend, message: &str) -> ResponseEnvelope {
    error(backend, 412, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(backend: &InMemoryBackend, request: TransportRequest) -> ResponseEnvelope {
        match backend.send(&request, &Credential::new("t")).await {
            RawOutcome::Response(response) => response,
            RawOutcome::Failed(failure) => panic!("unexpected transport failure: {failure:?}"),
        }
    }

    #[tokio::test]
    async fn test_azure_rev_test_guards_update() {
        let backend = InMemoryBackend::new(Backend::AzureDevops, "Web");
        let created = send(
            &backend,
            TransportRequest::new(Method::Post, "/Web/_apis/wit/workitems/$Task")
                .with_body(json!([{"op": "add", "path": "/fields/System.Title", "value": "A"}])),
        )
        .await;
        assert_eq!(created.body["rev"], 1);

        let stale = send(
            &backend,
            TransportRequest::new(Method::Patch, "/Web/_apis/wit/workitems/1").with_body(json!([
                {"op": "test", "path": "/rev", "value": 7},
                {"op": "add", "path": "/fields/System.Title", "value": "B"}
            ])),
        )
        .await;
        assert_eq!(stale.status, 412);

        let fresh = send(
            &backend,
            TransportRequest::new(Method::Patch, "/Web/_apis/wit/workitems/1").with_body(json!([
                {"op": "test", "path": "/rev", "value": 1},
                {"op": "add", "path": "/fields/System.Title", "value": "B"}
            ])),
        )
        .await;
        assert_eq!(fresh.status, 200);
        assert_eq!(fresh.body["rev"], 2);
        assert_eq!(fresh.body["fields"]["System.Title"], "B");
    }

    #[tokio::test]
    async fn test_github_pages_with_link_header() {
        let backend = InMemoryBackend::new(Backend::GitHub, "octo/app");
        for n in 1..=3 {
            backend.insert_native(json!({"number": n, "title": "t", "state": "open", "updated_at": "x"}));
        }

        let first = send(
            &backend,
            TransportRequest::get("/repos/octo/app/issues")
                .with_query("state", "all")
                .with_query("per_page", "2")
                .with_query("page", "1"),
        )
        .await;
        assert_eq!(first.body.as_array().map(Vec::len), Some(2));
        assert!(first.header("link").is_some_and(|l| l.contains("page=2")));
    }

    #[tokio::test]
    async fn test_jira_create_returns_stub_and_transitions() {
        let backend = InMemoryBackend::new(Backend::Jira, "PROJ");
        let created = send(
            &backend,
            TransportRequest::new(Method::Post, "/rest/api/3/issue")
                .with_body(json!({"fields": {"summary": "S", "issuetype": {"name": "Task"}}})),
        )
        .await;
        assert_eq!(created.status, 201);
        assert_eq!(created.body["key"], "PROJ-1");
        assert!(created.body.get("fields").is_none());

        let listing = send(&backend, TransportRequest::get("/rest/api/3/issue/PROJ-1/transitions")).await;
        assert_eq!(listing.body["transitions"].as_array().map(Vec::len), Some(3));

        let moved = send(
            &backend,
            TransportRequest::new(Method::Post, "/rest/api/3/issue/PROJ-1/transitions")
                .with_body(json!({"transition": {"id": "31"}})),
        )
        .await;
        assert_eq!(moved.status, 204);
        assert_eq!(
            backend.native("PROJ-1").unwrap()["fields"]["status"]["name"],
            "Done"
        );
    }

    #[tokio::test]
    async fn test_drop_response_still_applies() {
        let backend = InMemoryBackend::new(Backend::GitHub, "octo/app");
        backend.inject(Fault::DropResponse);

        let outcome = backend
            .send(
                &TransportRequest::new(Method::Post, "/repos/octo/app/issues")
                    .with_body(json!({"title": "lost"})),
                &Credential::new("t"),
            )
            .await;

        assert!(matches!(outcome, RawOutcome::Failed(ref f) if f.kind == TransportFailureKind::Timeout));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_header_checks_replay_idempotent_create() {
        let backend = InMemoryBackend::new(Backend::GitHub, "octo/app").with_header_checks(true);
        let request = TransportRequest::new(Method::Post, "/repos/octo/app/issues")
            .with_header(IDEMPOTENCY_HEADER, "k1")
            .with_body(json!({"title": "once"}));

        let first = send(&backend, request.clone()).await;
        let second = send(&backend, request).await;

        assert_eq!(first.body["number"], second.body["number"]);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_github_and_jira_ignore_headers_by_default() {
        let github = InMemoryBackend::new(Backend::GitHub, "octo/app");
        let request = TransportRequest::new(Method::Post, "/repos/octo/app/issues")
            .with_header(IDEMPOTENCY_HEADER, "k1")
            .with_body(json!({"title": "twice"}));
        send(&github, request.clone()).await;
        send(&github, request).await;
        assert_eq!(github.len(), 2);

        let stale = send(
            &github,
            TransportRequest::new(Method::Patch, "/repos/octo/app/issues/1")
                .with_header("If-Match", "not-the-version")
                .with_body(json!({"state": "closed"})),
        )
        .await;
        assert_eq!(stale.status, 200);
        assert_eq!(stale.body["state_reason"], "completed");

        let jira = InMemoryBackend::new(Backend::Jira, "PROJ");
        jira.insert_native(json!({"key": "PROJ-1", "fields": {"summary": "a", "updated": "v1"}}));
        let put = send(
            &jira,
            TransportRequest::new(Method::Put, "/rest/api/3/issue/PROJ-1")
                .with_header("If-Match", "v0")
                .with_body(json!({"fields": {"summary": "b"}})),
        )
        .await;
        assert_eq!(put.status, 204);
    }

    #[tokio::test]
    async fn test_label_and_tag_queries_filter() {
        let jira = InMemoryBackend::new(Backend::Jira, "PROJ");
        jira.insert_native(json!({"key": "PROJ-1", "fields": {"labels": ["a"]}}));
        jira.insert_native(json!({"key": "PROJ-2", "fields": {"labels": ["b"]}}));
        let search = send(
            &jira,
            TransportRequest::get("/rest/api/3/search")
                .with_query("jql", "project = \"PROJ\" AND labels = \"b\""),
        )
        .await;
        assert_eq!(search.body["total"], 1);
        assert_eq!(search.body["issues"][0]["key"], "PROJ-2");

        let azure = InMemoryBackend::new(Backend::AzureDevops, "Web");
        azure.insert_native(json!({"id": 1, "fields": {"System.Tags": "x; y"}}));
        azure.insert_native(json!({"id": 2, "fields": {"System.Tags": "z"}}));
        let wiql = send(
            &azure,
            TransportRequest::new(Method::Post, "/Web/_apis/wit/wiql").with_body(json!({
                "query": "SELECT [System.Id] FROM WorkItems WHERE [System.Tags] CONTAINS 'y'"
            })),
        )
        .await;
        assert_eq!(wiql.body["workItems"], json!([{"id": 1}]));
    }
}
