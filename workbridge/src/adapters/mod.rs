//! Platform adapters: mapping tables, translation and native requests.
//!
//! Backends are selected by the [`crate::model::Backend`] tag. Each one is
//! data (a [`PlatformMapping`]) plus the pure functions in this module.

mod mapping;
mod marker;
mod pagination;
mod requests;
mod translate;

pub use mapping::{FieldCodec, FieldMapping, IdPointer, MarkerSlot, PlatformMapping};
pub use marker::{find_marked, key_marker, mark_draft, marker_lookup, GITHUB_LOOKBACK};
pub use pagination::{next_github_page, page_request, read_page, Page, PageCursor, AZURE_MAX_BATCH};
pub use requests::{
    create, find_transition, get, jira_transition, jira_transitions, update, WritePlan,
    AZURE_API_VERSION, IDEMPOTENCY_HEADER,
};
pub(crate) use translate::set_pointer;
pub use translate::{
    draft_changes, encode_id, from_canonical, native_id, native_version, patch_changes,
    to_canonical, NativeChange,
};
