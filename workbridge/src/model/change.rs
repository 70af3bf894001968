//! Inputs to create, update and list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::item::{CanonicalState, CanonicalWorkItem, WorkItemType, STATE_OVERFLOW_KEY};

/// A work item to be created. The backend assigns id and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemDraft {
    /// Kind of item.
    pub item_type: WorkItemType,
    /// Title or summary.
    pub title: String,
    /// Initial state; the backend default when absent.
    pub state: Option<CanonicalState>,
    /// Parent id.
    pub parent_id: Option<String>,
    /// Canonical fields.
    pub fields: BTreeMap<String, Value>,
}

impl WorkItemDraft {
    /// Creates a draft with only a type and title.
    #[must_use]
    pub fn new(item_type: WorkItemType, title: impl Into<String>) -> Self {
        Self {
            item_type,
            title: title.into(),
            state: None,
            parent_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Sets the initial state.
    #[must_use]
    pub fn with_state(mut self, state: CanonicalState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the parent id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets a canonical field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// A sparse set of changes to an existing item.
///
/// A `Value::Null` field value clears that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemPatch {
    /// New title.
    pub title: Option<String>,
    /// New state. `Unrecognized` requires the native value under
    /// `$state` in `overflow`.
    pub state: Option<CanonicalState>,
    /// New parent id.
    pub parent_id: Option<String>,
    /// Canonical field changes.
    pub fields: BTreeMap<String, Value>,
    /// Native field changes.
    pub overflow: BTreeMap<String, Value>,
}

impl WorkItemPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A patch that writes every mapped property of `item` back.
    #[must_use]
    pub fn from_item(item: &CanonicalWorkItem) -> Self {
        Self {
            title: Some(item.title.clone()),
            state: Some(item.state),
            parent_id: item.parent_id.clone(),
            fields: item.fields.clone(),
            overflow: item.overflow.clone(),
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the state.
    #[must_use]
    pub fn with_state(mut self, state: CanonicalState) -> Self {
        self.state = Some(state);
        self
    }

    /// Moves the item to a native state with no canonical name.
    #[must_use]
    pub fn with_native_state(mut self, native: impl Into<String>) -> Self {
        self.state = Some(CanonicalState::Unrecognized);
        self.overflow
            .insert(STATE_OVERFLOW_KEY.to_string(), Value::String(native.into()));
        self
    }

    /// Sets the parent id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets a canonical field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Clears a canonical field.
    #[must_use]
    pub fn clear_field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::Null);
        self
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.state.is_none()
            && self.parent_id.is_none()
            && self.fields.is_empty()
            && self.overflow.is_empty()
    }
}

/// Selects the items returned by a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemQuery {
    /// Items per backend page; the client default when absent.
    pub page_size: Option<u32>,
    /// Backend-native filter: a WIQL condition, a JQL expression, or
    /// GitHub issue query parameters (`key=value&...`).
    pub filter: Option<String>,
    /// Keep only items of this type.
    pub item_type: Option<WorkItemType>,
    /// Keep only items in this state.
    pub state: Option<CanonicalState>,
    /// Stop after this many items.
    pub limit: Option<usize>,
}

impl WorkItemQuery {
    /// A query for every item of the target.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets the backend-native filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Keeps only items of one type.
    #[must_use]
    pub fn with_type(mut self, item_type: WorkItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    /// Keeps only items in one state.
    #[must_use]
    pub fn with_state(mut self, state: CanonicalState) -> Self {
        self.state = Some(state);
        self
    }

    /// Caps the number of items.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an item passes the client-side filters.
    #[must_use]
    pub fn matches(&self, item: &CanonicalWorkItem) -> bool {
        self.item_type.map_or(true, |t| t == item.item_type)
            && self.state.map_or(true, |s| s == item.state)
    }
}
