//! Create markers.
//!
//! Only some backends act on `Idempotency-Key`, so every create also
//! carries a marker derived from the key: a tag or label where the backend
//! has one, an HTML comment at the end of the description otherwise. A
//! retried create looks the marker up first and returns the item an
//! earlier attempt created instead of posting again. Markers are removed
//! when items are read.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::mapping::{MarkerSlot, PlatformMapping};
use super::pagination::{page_request, PageCursor};
use crate::core::{ErrorKind, Failure, Outcome};
use crate::model::{Backend, BackendTarget, WorkItemDraft, WorkItemQuery};
use crate::transport::TransportRequest;

const PREFIX: &str = "workbridge-key-";

/// Recent GitHub issues scanned for a marker.
pub const GITHUB_LOOKBACK: u32 = 30;

/// The marker for an idempotency key.
#[must_use]
pub fn key_marker(key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{PREFIX}{}", &digest[..24])
}

/// A copy of `draft` carrying `marker`.
///
/// A marker field holding a value of the wrong shape is left alone so the
/// field still fails validation.
#[must_use]
pub fn mark_draft(draft: &WorkItemDraft, backend: Backend, marker: &str) -> WorkItemDraft {
    let slot = PlatformMapping::of(backend).key_marker;
    let mut marked = draft.clone();
    let value = marked
        .fields
        .entry(slot.field().to_string())
        .or_insert(Value::Null);

    match slot {
        MarkerSlot::Labels => match value {
            Value::Array(labels) => labels.push(Value::from(marker)),
            Value::Null => *value = json!([marker]),
            _ => {}
        },
        MarkerSlot::Description => match value {
            Value::String(text) if !text.is_empty() => {
                text.push_str("\n\n");
                text.push_str(&comment(marker));
            }
            Value::Null | Value::String(_) => *value = Value::String(comment(marker)),
            _ => {}
        },
    }
    marked
}

/// Removes any marker from canonical fields read off a backend.
pub(crate) fn strip_marker(slot: MarkerSlot, fields: &mut BTreeMap<String, Value>) {
    let name = slot.field();
    let emptied = match (slot, fields.get_mut(name)) {
        (MarkerSlot::Labels, Some(Value::Array(labels))) => {
            let before = labels.len();
            labels.retain(|label| !label.as_str().is_some_and(|l| l.starts_with(PREFIX)));
            labels.len() != before && labels.is_empty()
        }
        (MarkerSlot::Description, Some(Value::String(text))) => {
            match text.find(&format!("<!-- {PREFIX}")) {
                Some(at) => {
                    text.truncate(at);
                    let trimmed = text.trim_end().len();
                    text.truncate(trimmed);
                    text.is_empty()
                }
                None => false,
            }
        }
        _ => false,
    };
    if emptied {
        fields.remove(name);
    }
}

/// The request that finds an item created with `marker`.
pub fn marker_lookup(target: &BackendTarget, marker: &str) -> Outcome<TransportRequest> {
    let (query, page_size) = match target.backend {
        Backend::AzureDevops => (
            WorkItemQuery::all().with_filter(format!("[System.Tags] CONTAINS '{marker}'")),
            1,
        ),
        Backend::GitHub => (
            WorkItemQuery::all().with_filter("sort=created&direction=desc"),
            GITHUB_LOOKBACK,
        ),
        Backend::Jira => (WorkItemQuery::all().with_filter(format!("labels = \"{marker}\"")), 1),
    };
    page_request(target, &query, &PageCursor::Start, page_size)?.ok_or_else(|| {
        Failure::local(ErrorKind::Unknown, "marker lookup produced no request")
    })
}

/// The native item carrying `marker` in a lookup response, if any.
///
/// Azure DevOps answers with ids only, so its match is an `{"id": ..}` stub.
#[must_use]
pub fn find_marked(backend: Backend, body: &Value, marker: &str) -> Option<Value> {
    match backend {
        Backend::AzureDevops => {
            let id = body.pointer("/workItems/0/id")?;
            Some(json!({ "id": id }))
        }
        Backend::GitHub => body
            .as_array()?
            .iter()
            .find(|issue| {
                issue
                    .get("body")
                    .and_then(Value::as_str)
                    .is_some_and(|text| text.contains(&comment(marker)))
            })
            .cloned(),
        Backend::Jira => body
            .get("issues")?
            .as_array()?
            .iter()
            .find(|issue| {
                issue
                    .pointer("/fields/labels")
                    .and_then(Value::as_array)
                    .is_some_and(|labels| labels.iter().any(|l| l == marker))
            })
            .cloned(),
    }
}

fn comment(marker: &str) -> String {
    format!("<!-- {marker} -->")
}
