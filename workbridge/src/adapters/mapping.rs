//! Static per-backend mapping tables.
//!
//! Each backend is described by data only: JSON pointers for the fixed
//! properties, a field table, and the state and type tables.
//! Translation code selects a table by [`Backend`] tag.

use crate::model::{fields, Backend, CanonicalState, WorkItemType};

/// How a native value is converted to and from its canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCodec {
    /// Copied unchanged.
    Plain,
    /// A `"a; b"` string natively, a list of strings canonically.
    SemicolonList,
    /// A list of strings or `{ "name": .. }` objects natively, a list of
    /// strings canonically.
    NameList,
}

/// Where a create marker is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSlot {
    /// An extra tag or label.
    Labels,
    /// An HTML comment appended to the description.
    Description,
}

impl MarkerSlot {
    /// The canonical field holding the marker.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Labels => fields::LABELS,
            Self::Description => fields::DESCRIPTION,
        }
    }
}

/// One canonical field and where it lives in the native document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// Canonical field name.
    pub canonical: &'static str,
    /// JSON pointer into the native document.
    pub pointer: &'static str,
    /// Value conversion.
    pub codec: FieldCodec,
}

/// Where an identifier lives and whether it is numeric on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPointer {
    /// JSON pointer into the native document.
    pub pointer: &'static str,
    /// Written as a JSON number when the canonical string is a plain integer.
    pub numeric: bool,
}

/// Everything needed to translate one backend's work items.
#[derive(Debug, Clone, Copy)]
pub struct PlatformMapping {
    /// The backend described.
    pub backend: Backend,
    /// Item id.
    pub id: IdPointer,
    /// Concurrency stamp.
    pub version: IdPointer,
    /// Object whose unmapped keys are kept as overflow; `""` is the root.
    pub container: &'static str,
    /// Title.
    pub title: &'static str,
    /// Native state name.
    pub state: &'static str,
    /// Native reason qualifying the state, written as `state:reason` in
    /// the state tables.
    pub state_reason: Option<&'static str>,
    /// Native type name.
    pub item_type: &'static str,
    /// Type assumed when the native document has none.
    pub default_type: Option<WorkItemType>,
    /// Parent id.
    pub parent: IdPointer,
    /// Canonical fields the backend can represent.
    pub fields: &'static [FieldMapping],
    /// Canonical state to native state name.
    pub states: &'static [(CanonicalState, &'static str)],
    /// Write-only fallbacks for canonical states the backend has no
    /// native state for. They read back as whatever `states` maps them to.
    pub aliases: &'static [(CanonicalState, &'static str)],
    /// Canonical type to native type name.
    pub types: &'static [(WorkItemType, &'static str)],
    /// Container keys the backend computes itself and rejects on update.
    pub read_only: &'static [&'static str],
    /// Whether the backend itself rejects a write carrying a stale version.
    pub conditional_writes: bool,
    /// Where creates carry their marker.
    pub key_marker: MarkerSlot,
}

const fn field(canonical: &'static str, pointer: &'static str) -> FieldMapping {
    FieldMapping {
        canonical,
        pointer,
        codec: FieldCodec::Plain,
    }
}

const fn text(pointer: &'static str) -> IdPointer {
    IdPointer {
        pointer,
        numeric: false,
    }
}

const fn number(pointer: &'static str) -> IdPointer {
    IdPointer {
        pointer,
        numeric: true,
    }
}

static AZURE_DEVOPS: PlatformMapping = PlatformMapping {
    backend: Backend::AzureDevops,
    id: number("/id"),
    version: number("/rev"),
    container: "/fields",
    title: "/fields/System.Title",
    state: "/fields/System.State",
    state_reason: None,
    item_type: "/fields/System.WorkItemType",
    default_type: None,
    parent: number("/fields/System.Parent"),
    fields: &[
        field(fields::DESCRIPTION, "/fields/System.Description"),
        field(fields::PRIORITY, "/fields/Microsoft.VSTS.Common.Priority"),
        field(fields::ASSIGNEE, "/fields/System.AssignedTo"),
        FieldMapping {
            canonical: fields::LABELS,
            pointer: "/fields/System.Tags",
            codec: FieldCodec::SemicolonList,
        },
        field(fields::STORY_POINTS, "/fields/Microsoft.VSTS.Scheduling.StoryPoints"),
        field(fields::AREA_PATH, "/fields/System.AreaPath"),
        field(fields::ITERATION_PATH, "/fields/System.IterationPath"),
    ],
    states: &[
        (CanonicalState::New, "New"),
        (CanonicalState::Active, "Active"),
        (CanonicalState::Closed, "Closed"),
        (CanonicalState::Removed, "Removed"),
    ],
    aliases: &[],
    types: &[
        (WorkItemType::Feature, "Feature"),
        (WorkItemType::Task, "Task"),
        (WorkItemType::Bug, "Bug"),
        (WorkItemType::Issue, "Issue"),
    ],
    read_only: &[
        "System.Id",
        "System.Rev",
        "System.Watermark",
        "System.TeamProject",
        "System.CreatedDate",
        "System.CreatedBy",
        "System.ChangedDate",
        "System.ChangedBy",
        "System.AuthorizedDate",
        "System.AuthorizedAs",
        "System.RevisedDate",
        "System.CommentCount",
        "System.NodeName",
        "System.AreaId",
        "System.IterationId",
        "System.BoardColumn",
        "System.BoardColumnDone",
        "Microsoft.VSTS.Common.StateChangeDate",
        "Microsoft.VSTS.Common.ActivatedDate",
        "Microsoft.VSTS.Common.ActivatedBy",
        "Microsoft.VSTS.Common.ClosedDate",
        "Microsoft.VSTS.Common.ClosedBy",
    ],
    conditional_writes: true,
    key_marker: MarkerSlot::Labels,
};

static GITHUB: PlatformMapping = PlatformMapping {
    backend: Backend::GitHub,
    id: number("/number"),
    version: text("/updated_at"),
    container: "",
    title: "/title",
    state: "/state",
    state_reason: Some("/state_reason"),
    item_type: "/type/name",
    default_type: Some(WorkItemType::Issue),
    parent: number("/parent/number"),
    fields: &[
        field(fields::DESCRIPTION, "/body"),
        field(fields::ASSIGNEE, "/assignee/login"),
        FieldMapping {
            canonical: fields::LABELS,
            pointer: "/labels",
            codec: FieldCodec::NameList,
        },
    ],
    states: &[
        (CanonicalState::New, "open"),
        (CanonicalState::Closed, "closed:completed"),
        (CanonicalState::Removed, "closed:not_planned"),
    ],
    aliases: &[(CanonicalState::Active, "open")],
    types: &[
        (WorkItemType::Feature, "Feature"),
        (WorkItemType::Task, "Task"),
        (WorkItemType::Bug, "Bug"),
        (WorkItemType::Issue, "Issue"),
    ],
    read_only: &[
        "id",
        "node_id",
        "url",
        "repository_url",
        "labels_url",
        "comments_url",
        "events_url",
        "html_url",
        "timeline_url",
        "user",
        "assignees",
        "comments",
        "created_at",
        "closed_at",
        "closed_by",
        "author_association",
        "active_lock_reason",
        "locked",
        "reactions",
        "pull_request",
        "performed_via_github_app",
        "sub_issues_summary",
    ],
    conditional_writes: false,
    key_marker: MarkerSlot::Description,
};

static JIRA: PlatformMapping = PlatformMapping {
    backend: Backend::Jira,
    id: text("/key"),
    version: text("/fields/updated"),
    container: "/fields",
    title: "/fields/summary",
    state: "/fields/status/name",
    state_reason: None,
    item_type: "/fields/issuetype/name",
    default_type: None,
    parent: text("/fields/parent/key"),
    fields: &[
        field(fields::DESCRIPTION, "/fields/description"),
        field(fields::PRIORITY, "/fields/priority/name"),
        field(fields::ASSIGNEE, "/fields/assignee/accountId"),
        field(fields::LABELS, "/fields/labels"),
        field(fields::STORY_POINTS, "/fields/customfield_10016"),
    ],
    states: &[
        (CanonicalState::New, "To Do"),
        (CanonicalState::Active, "In Progress"),
        (CanonicalState::Closed, "Done"),
        (CanonicalState::Removed, "Won't Do"),
    ],
    aliases: &[],
    types: &[
        (WorkItemType::Feature, "Epic"),
        (WorkItemType::Task, "Task"),
        (WorkItemType::Bug, "Bug"),
        (WorkItemType::Issue, "Story"),
    ],
    read_only: &[
        "project",
        "created",
        "creator",
        "reporter",
        "lastViewed",
        "resolution",
        "resolutiondate",
        "statuscategorychangedate",
        "statusCategory",
        "votes",
        "watches",
        "worklog",
        "comment",
        "attachment",
        "issuelinks",
        "subtasks",
        "progress",
        "aggregateprogress",
        "aggregatetimespent",
        "aggregatetimeestimate",
        "aggregatetimeoriginalestimate",
        "timespent",
        "workratio",
    ],
    conditional_writes: false,
    key_marker: MarkerSlot::Labels,
};

impl PlatformMapping {
    /// Returns the table for a backend.
    #[must_use]
    pub fn of(backend: Backend) -> &'static Self {
        match backend {
            Backend::AzureDevops => &AZURE_DEVOPS,
            Backend::GitHub => &GITHUB,
            Backend::Jira => &JIRA,
        }
    }

    /// Native name of a mapped canonical state, falling back to its alias.
    #[must_use]
    pub fn native_state(&self, state: CanonicalState) -> Option<&'static str> {
        self.states
            .iter()
            .chain(self.aliases)
            .find(|(canonical, _)| *canonical == state)
            .map(|(_, native)| *native)
    }

    /// Canonical state of a native state name, if mapped.
    ///
    /// A bare `state` with no exact entry matches the first `state:reason`
    /// entry sharing that state.
    #[must_use]
    pub fn canonical_state(&self, native: &str) -> Option<CanonicalState> {
        let exact = self.states.iter().find(|(_, name)| *name == native);
        let by_state = || {
            self.states
                .iter()
                .find(|(_, name)| name.split(':').next() == Some(native))
        };
        exact.or_else(by_state).map(|(canonical, _)| *canonical)
    }

    /// Whether the backend rejects writes to a container key.
    #[must_use]
    pub fn is_read_only(&self, key: &str) -> bool {
        self.read_only.contains(&key)
    }

    /// Native name of a canonical type.
    #[must_use]
    pub fn native_type(&self, item_type: WorkItemType) -> Option<&'static str> {
        self.types
            .iter()
            .find(|(canonical, _)| *canonical == item_type)
            .map(|(_, native)| *native)
    }

    /// Canonical type of a native type name, ignoring case.
    #[must_use]
    pub fn canonical_type(&self, native: &str) -> Option<WorkItemType> {
        self.types
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(native))
            .map(|(canonical, _)| *canonical)
    }

    /// The mapping of a canonical field, if the backend has one.
    #[must_use]
    pub fn field(&self, canonical: &str) -> Option<&'static FieldMapping> {
        self.fields.iter().find(|f| f.canonical == canonical)
    }

    /// Keys of the container object claimed by the mapping.
    pub fn claimed_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        let container = self.container;
        [
            self.id.pointer,
            self.version.pointer,
            self.title,
            self.state,
            self.item_type,
            self.parent.pointer,
        ]
        .into_iter()
        .chain(self.state_reason)
        .chain(self.fields.iter().map(|f| f.pointer))
        .filter_map(move |pointer| container_key(container, pointer))
    }
}

/// The first key below `container` on the path of `pointer`.
pub(crate) fn container_key(container: &str, pointer: &'static str) -> Option<&'static str> {
    let rest = pointer.strip_prefix(container)?.strip_prefix('/')?;
    rest.split('/').next().filter(|key| !key.is_empty())
}
