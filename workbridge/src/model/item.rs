//! The canonical work item and its enumerations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Overflow key holding the native state of an [`CanonicalState::Unrecognized`] item.
pub const STATE_OVERFLOW_KEY: &str = "$state";

/// Canonical field names understood by at least one backend.
pub mod fields {
    /// Long-form description or body.
    pub const DESCRIPTION: &str = "description";
    /// Priority (numeric on Azure DevOps, named on Jira).
    pub const PRIORITY: &str = "priority";
    /// Assigned user.
    pub const ASSIGNEE: &str = "assignee";
    /// Labels or tags, as a list of strings.
    pub const LABELS: &str = "labels";
    /// Story point estimate.
    pub const STORY_POINTS: &str = "story_points";
    /// Azure DevOps area path.
    pub const AREA_PATH: &str = "area_path";
    /// Azure DevOps iteration path.
    pub const ITERATION_PATH: &str = "iteration_path";
}

/// The backend a target speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Azure DevOps Boards.
    AzureDevops,
    /// GitHub Issues.
    #[serde(rename = "github")]
    GitHub,
    /// Jira Cloud.
    Jira,
}

impl Backend {
    /// All supported backends.
    pub const ALL: [Self; 3] = [Self::AzureDevops, Self::GitHub, Self::Jira];
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AzureDevops => write!(f, "azure_devops"),
            Self::GitHub => write!(f, "github"),
            Self::Jira => write!(f, "jira"),
        }
    }
}

/// Kind of work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemType {
    /// A large body of work (an epic on Jira).
    Feature,
    /// A unit of implementation work.
    Task,
    /// A defect.
    Bug,
    /// A general issue or story.
    Issue,
}

impl fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature => write!(f, "feature"),
            Self::Task => write!(f, "task"),
            Self::Bug => write!(f, "bug"),
            Self::Issue => write!(f, "issue"),
        }
    }
}

/// Backend-agnostic lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalState {
    /// Not started.
    New,
    /// In progress.
    Active,
    /// Done.
    Closed,
    /// Abandoned or won't do.
    Removed,
    /// A native state with no canonical counterpart; the native value is
    /// kept in the overflow map under [`STATE_OVERFLOW_KEY`].
    Unrecognized,
}

impl CanonicalState {
    /// The states every backend must map.
    pub const MAPPED: [Self; 4] = [Self::New, Self::Active, Self::Closed, Self::Removed];
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
            Self::Removed => write!(f, "removed"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// A work item in the normalized shape shared by every backend.
///
/// The id and version token are assigned by the backend and have no
/// setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalWorkItem {
    id: String,
    /// Kind of item.
    pub item_type: WorkItemType,
    /// Title or summary.
    pub title: String,
    /// Lifecycle state.
    pub state: CanonicalState,
    /// Id of the parent item. A relation only.
    pub parent_id: Option<String>,
    /// Canonical field name to value.
    pub fields: BTreeMap<String, Value>,
    /// Native field name to value, for everything without a canonical name.
    pub overflow: BTreeMap<String, Value>,
    version_token: String,
}

impl CanonicalWorkItem {
    /// Creates an item as read from a backend.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        item_type: WorkItemType,
        title: impl Into<String>,
        version_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            item_type,
            title: title.into(),
            state: CanonicalState::New,
            parent_id: None,
            fields: BTreeMap::new(),
            overflow: BTreeMap::new(),
            version_token: version_token.into(),
        }
    }

    /// Sets the state.
    #[must_use]
    pub fn with_state(mut self, state: CanonicalState) -> Self {
        self.state = state;
        self
    }

    /// Marks the item as carrying a native state with no canonical name.
    #[must_use]
    pub fn with_unrecognized_state(mut self, native: impl Into<String>) -> Self {
        self.state = CanonicalState::Unrecognized;
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

    /// Sets a canonical field; a null value removes it.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.fields.remove(&name);
            }
            value => {
                self.fields.insert(name, value);
            }
        }
        self
    }

    /// Sets a native overflow field.
    #[must_use]
    pub fn with_overflow(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overflow.insert(name.into(), value.into());
        self
    }

    /// The backend-assigned id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The backend-assigned concurrency stamp.
    #[must_use]
    pub fn version_token(&self) -> &str {
        &self.version_token
    }

    /// The native state kept for an unrecognized state.
    #[must_use]
    pub fn native_state(&self) -> Option<&str> {
        self.overflow.get(STATE_OVERFLOW_KEY).and_then(Value::as_str)
    }

    /// Reads a canonical field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
