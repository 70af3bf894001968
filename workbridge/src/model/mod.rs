//! The canonical work-item model shared by every backend.

mod change;
mod item;
mod target;

pub use change::{WorkItemDraft, WorkItemPatch, WorkItemQuery};
pub use item::{
    fields, Backend, CanonicalState, CanonicalWorkItem, WorkItemType, STATE_OVERFLOW_KEY,
};
pub use target::BackendTarget;
