use serde::{Deserialize, Serialize};

pub mod config_file;
pub mod manager;
pub mod notify;
pub mod source;
pub mod store;
pub mod viewport;

// Re-export for convenience
pub use manager::{DEFAULT_FETCH_TIMEOUT, DEFAULT_SNAPSHOT_KEY, FeedOptions, FetchOutcome, RepoFeed};
pub use notify::{HandlerId, Notifier};
pub use source::{MockPage, MockSource, Page, PageSource, TransportError};
pub use store::{MemoryStore, SnapshotStore, SqliteStore, StoreError};
pub use viewport::VisibilityEdge;

/// One repository as known to the remote listing API.
///
/// This is the durable record: exactly the fields that survive a
/// persistence round-trip. Unknown fields in the remote JSON are ignored
/// on deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
}

/// A working-set entry: one durable record plus transient presentation
/// state.
///
/// Only the `record` is ever persisted; editing state lives and dies with
/// the session, so a reload can never resurrect a half-finished edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub record: RepoRecord,
    pub editing: bool,
    pub draft_name: Option<String>,
    pub draft_description: Option<String>,
}

impl Entry {
    pub fn new(record: RepoRecord) -> Self {
        Self {
            record,
            editing: false,
            draft_name: None,
            draft_description: None,
        }
    }

    /// The name a renderer should display: the draft while one exists,
    /// falling back to the committed value.
    pub fn display_name(&self) -> &str {
        self.draft_name
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.record.name)
    }

    /// The description a renderer should display (draft over committed).
    pub fn display_description(&self) -> Option<&str> {
        self.draft_description
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(self.record.description.as_deref())
    }
}

/// Which editable field a draft update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Name,
    Description,
}

/// Pagination bookkeeping: the next page to request, the fixed page size,
/// and the best current estimate of the total page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub current_page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl PageCursor {
    pub fn new(per_page: u32) -> Self {
        Self {
            current_page: 1,
            per_page,
            total_pages: 1,
        }
    }

    /// Whether another fetch may be attempted.
    pub fn has_more(&self) -> bool {
        self.current_page <= self.total_pages
    }
}
