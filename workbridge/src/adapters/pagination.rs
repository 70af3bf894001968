//! Listing requests and page cursors per backend.
//!
//! - Azure DevOps: a WIQL query returns ids, which are then fetched in batches
//! - GitHub: `page`/`per_page`, following the `Link: rel="next"` header
//! - Jira: `startAt`/`maxResults` until `total` is reached

use regex::Regex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::LazyLock;

use super::requests::{project, AZURE_API_VERSION};
use crate::core::{ErrorKind, Failure, Outcome};
use crate::model::{Backend, BackendTarget, WorkItemQuery};
use crate::transport::{Method, ResponseEnvelope, TransportRequest};

/// Largest id batch Azure DevOps accepts.
pub const AZURE_MAX_BATCH: u32 = 200;

// Both patterns are literals covered by the tests below.
#[allow(clippy::expect_used)]
static LINK_NEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("valid regex"));
#[allow(clippy::expect_used)]
static PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]page=(\d+)").expect("valid regex"));

/// Where the next page of a listing starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Nothing fetched yet.
    Start,
    /// Azure DevOps ids still to fetch.
    AzureIds(VecDeque<String>),
    /// Next GitHub page number.
    GitHubPage(u32),
    /// Next Jira `startAt` offset.
    JiraOffset(u64),
    /// The listing is complete.
    Done,
}

/// One page of native items and the cursor after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Native item payloads.
    pub items: Vec<Value>,
    /// Cursor for the following page.
    pub next: PageCursor,
}

/// Builds the request for the page at `cursor`, or `None` when done.
pub fn page_request(
    target: &BackendTarget,
    query: &WorkItemQuery,
    cursor: &PageCursor,
    page_size: u32,
) -> Outcome<Option<TransportRequest>> {
    let page_size = page_size.max(1);

    let request = match (target.backend, cursor) {
        (_, PageCursor::Done) => return Ok(None),
        (Backend::AzureDevops, PageCursor::Start) => {
            let mut wiql =
                "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = @project".to_string();
            if let Some(filter) = &query.filter {
                wiql.push_str(&format!(" AND ({filter})"));
            }
            wiql.push_str(" ORDER BY [System.Id]");

            TransportRequest::new(Method::Post, format!("/{}/_apis/wit/wiql", project(target)?))
                .with_query("api-version", AZURE_API_VERSION)
                .with_body(json!({ "query": wiql }))
        }
        (Backend::AzureDevops, PageCursor::AzureIds(ids)) => {
            let batch = page_size.min(AZURE_MAX_BATCH) as usize;
            let ids: Vec<&str> = ids.iter().take(batch).map(String::as_str).collect();
            TransportRequest::get(format!("/{}/_apis/wit/workitems", project(target)?))
                .with_query("ids", ids.join(","))
                .with_query("api-version", AZURE_API_VERSION)
        }
        (Backend::GitHub, PageCursor::Start | PageCursor::GitHubPage(_)) => {
            let page = match cursor {
                PageCursor::GitHubPage(page) => *page,
                _ => 1,
            };
            let mut request = TransportRequest::get(format!("/repos/{}/issues", project(target)?));
            let filters = parse_github_filter(query.filter.as_deref());
            if !filters.iter().any(|(k, _)| k == "state") {
                request = request.with_query("state", "all");
            }
            for (key, value) in filters {
                request = request.with_query(key, value);
            }
            request
                .with_query("per_page", page_size.to_string())
                .with_query("page", page.to_string())
        }
        (Backend::Jira, PageCursor::Start | PageCursor::JiraOffset(_)) => {
            let start_at = match cursor {
                PageCursor::JiraOffset(offset) => *offset,
                _ => 0,
            };
            TransportRequest::get("/rest/api/3/search")
                .with_query("jql", jql(target, query))
                .with_query("startAt", start_at.to_string())
                .with_query("maxResults", page_size.to_string())
        }
        (backend, cursor) => {
            return Err(Failure::local(
                ErrorKind::Unknown,
                format!("cursor {cursor:?} does not belong to a {backend} listing"),
            ));
        }
    };

    Ok(Some(request))
}

/// Reads the items and the next cursor out of a listing response.
pub fn read_page(
    backend: Backend,
    cursor: &PageCursor,
    page_size: u32,
    response: &ResponseEnvelope,
) -> Outcome<Page> {
    let page_size = page_size.max(1);
    let body = &response.body;

    match (backend, cursor) {
        (Backend::AzureDevops, PageCursor::Start) => {
            let ids: VecDeque<String> = array_at(backend, body, "/workItems")?
                .iter()
                .filter_map(|entry| match entry.get("id")? {
                    Value::Number(n) => Some(n.to_string()),
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            Ok(Page {
                items: Vec::new(),
                next: if ids.is_empty() { PageCursor::Done } else { PageCursor::AzureIds(ids) },
            })
        }
        (Backend::AzureDevops, PageCursor::AzureIds(ids)) => {
            let batch = page_size.min(AZURE_MAX_BATCH) as usize;
            let rest: VecDeque<String> = ids.iter().skip(batch).cloned().collect();
            Ok(Page {
                items: array_at(backend, body, "/value")?.clone(),
                next: if rest.is_empty() { PageCursor::Done } else { PageCursor::AzureIds(rest) },
            })
        }
        (Backend::GitHub, _) => {
            let items = array_at(backend, body, "")?
                .iter()
                .filter(|issue| issue.get("pull_request").is_none())
                .cloned()
                .collect();
            let next = response
                .header("link")
                .and_then(next_github_page)
                .map_or(PageCursor::Done, PageCursor::GitHubPage);
            Ok(Page { items, next })
        }
        (Backend::Jira, _) => {
            let items = array_at(backend, body, "/issues")?.clone();
            let start_at = body.get("startAt").and_then(Value::as_u64).unwrap_or(0);
            let total = body.get("total").and_then(Value::as_u64).unwrap_or(0);
            let reached = start_at + items.len() as u64;
            let next = if items.is_empty() || reached >= total {
                PageCursor::Done
            } else {
                PageCursor::JiraOffset(reached)
            };
            Ok(Page { items, next })
        }
        (_, cursor) => Err(Failure::local(
            ErrorKind::Unknown,
            format!("cursor {cursor:?} does not belong to a {backend} listing"),
        )),
    }
}

/// Extracts the next page number from a GitHub `Link` header.
#[must_use]
pub fn next_github_page(link: &str) -> Option<u32> {
    let url = LINK_NEXT.captures(link)?.get(1)?.as_str();
    PAGE_PARAM.captures(url)?.get(1)?.as_str().parse().ok()
}

fn parse_github_filter(filter: Option<&str>) -> Vec<(String, String)> {
    filter
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn jql(target: &BackendTarget, query: &WorkItemQuery) -> String {
    let project = target.project.as_deref().filter(|p| !p.is_empty());
    match (project, query.filter.as_deref()) {
        (Some(project), Some(filter)) => format!("project = \"{project}\" AND {filter}"),
        (Some(project), None) => format!("project = \"{project}\" ORDER BY key ASC"),
        (None, Some(filter)) => filter.to_string(),
        (None, None) => "ORDER BY key ASC".to_string(),
    }
}

fn array_at<'a>(backend: Backend, body: &'a Value, pointer: &str) -> Outcome<&'a Vec<Value>> {
    body.pointer(pointer).and_then(Value::as_array).ok_or_else(|| {
        Failure::terminal(
            ErrorKind::Unknown,
            format!("malformed {backend} listing: expected an array at '{pointer}'"),
        )
    })
}
