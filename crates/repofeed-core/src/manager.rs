//! The paginated collection manager.
//!
//! [`RepoFeed`] pulls pages from a [`PageSource`] one at a time,
//! deduplicates by id, appends to the working set, and re-persists the
//! whole set through a [`SnapshotStore`] on every mutation. Local edits
//! (drafts, commits, deletes) never touch the remote API.
//!
//! Concurrency model: one logical thread of mutation. State lives behind
//! a mutex that is never held across an await point, so edits and deletes
//! proceed while a fetch is outstanding. An atomic latch enforces
//! single-flight fetching; overlapping fetch requests are dropped, not
//! queued.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::source::{PageSource, TransportError};
use crate::store::SnapshotStore;
use crate::{DraftField, Entry, PageCursor, RepoRecord};

/// Default timeout applied to every page request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default snapshot key in the durable store.
pub const DEFAULT_SNAPSHOT_KEY: &str = "repos";

/// Tuning knobs for [`RepoFeed`].
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Page size, fixed for the session.
    pub per_page: u32,
    /// Key under which the serialized working set is stored.
    pub snapshot_key: String,
    /// Per-request timeout for the remote source.
    pub fetch_timeout: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            per_page: 30,
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// What a fetch attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The persisted snapshot was adopted; no fetch was needed.
    Seeded,
    /// A page was applied; the count is new records after dedup.
    Fetched(usize),
    /// Another fetch was already in flight; this request was dropped.
    InFlight,
    /// The cursor is past the last known page.
    Exhausted,
    /// The response arrived after a [`reset`](RepoFeed::reset) and was
    /// discarded.
    Stale,
    /// The fetch failed; the error was logged and the state left
    /// unchanged.
    Failed,
}

struct FeedState {
    entries: Vec<Entry>,
    /// Ids present in `entries`; kept in sync on every mutation.
    seen: HashSet<u64>,
    cursor: PageCursor,
    initial_loading: bool,
    /// True until this session has persisted its own snapshot; a fresh
    /// session's very first page replaces the working set instead of
    /// appending to it.
    fresh_session: bool,
}

/// Clears the single-flight latch on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Incremental pager over a remote repository listing.
pub struct RepoFeed<S, P> {
    source: S,
    store: P,
    client: reqwest::Client,
    options: FeedOptions,
    /// Never held across an await point.
    state: Mutex<FeedState>,
    fetching: AtomicBool,
    /// Bumped by `reset`; an in-flight fetch from an older generation
    /// discards its response.
    generation: AtomicU64,
}

impl<S: PageSource, P: SnapshotStore> RepoFeed<S, P> {
    /// Build a feed, seeding the working set from the persisted snapshot
    /// when one exists. An unreadable or unparseable snapshot degrades to
    /// an empty start.
    pub fn new(source: S, store: P, options: FeedOptions) -> Self {
        let snapshot = match store.load(&options.snapshot_key) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load snapshot, starting empty");
                None
            }
        };
        let records: Vec<RepoRecord> = snapshot
            .as_deref()
            .and_then(|json| match serde_json::from_str(json) {
                Ok(records) => Some(records),
                Err(e) => {
                    tracing::warn!(error = %e, "snapshot unparseable, starting empty");
                    None
                }
            })
            .unwrap_or_default();

        let seeded = !records.is_empty();
        if seeded {
            tracing::debug!(count = records.len(), "working set seeded from snapshot");
        }
        let seen: HashSet<u64> = records.iter().map(|r| r.id).collect();
        let entries: Vec<Entry> = records.into_iter().map(Entry::new).collect();

        Self {
            source,
            store,
            client: reqwest::Client::new(),
            state: Mutex::new(FeedState {
                entries,
                seen,
                cursor: PageCursor::new(options.per_page),
                initial_loading: !seeded,
                fresh_session: !seeded,
            }),
            fetching: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            options,
        }
    }

    /// Use a preconfigured HTTP client instead of the default one.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    // A panicked holder cannot leave FeedState half-mutated; recover the lock.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Complete initialization: fetch the first page iff the snapshot
    /// produced nothing.
    pub async fn start(&self) -> Result<FetchOutcome, TransportError> {
        if !self.is_empty() {
            return Ok(FetchOutcome::Seeded);
        }
        self.fetch_next_page().await
    }

    /// Fetch and apply the next page.
    ///
    /// Single-flight: a call while another fetch is outstanding returns
    /// [`FetchOutcome::InFlight`] without touching the source. On
    /// transport failure the working set and cursor are unchanged and the
    /// fetch flags are cleared; the error is logged here and also
    /// returned for callers that care.
    pub async fn fetch_next_page(&self) -> Result<FetchOutcome, TransportError> {
        if self
            .fetching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("fetch already in flight, dropping request");
            return Ok(FetchOutcome::InFlight);
        }
        let _flight = FlightGuard(&self.fetching);

        let generation = self.generation.load(Ordering::SeqCst);
        let (page, per_page) = {
            let state = self.lock_state();
            if !state.cursor.has_more() {
                return Ok(FetchOutcome::Exhausted);
            }
            (state.cursor.current_page, state.cursor.per_page)
        };

        let fetched = self
            .source
            .fetch_page(page, per_page, &self.client, self.options.fetch_timeout)
            .await;

        let page_data = match fetched {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(source = self.source.name(), page, error = %e, "page fetch failed");
                self.lock_state().initial_loading = false;
                return Err(e);
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(page, "discarding response fetched before reset");
            return Ok(FetchOutcome::Stale);
        }

        let (snapshot, appended) = {
            let mut state = self.lock_state();
            if let Some(last) = page_data.last_page {
                state.cursor.total_pages = last.max(1);
            }

            let fresh: Vec<RepoRecord> = page_data
                .records
                .into_iter()
                .filter(|r| !state.seen.contains(&r.id))
                .collect();
            let appended = fresh.len();

            if page == 1 && state.fresh_session {
                // A fresh session's first page must not be unioned with
                // whatever raced into memory before it.
                state.seen = fresh.iter().map(|r| r.id).collect();
                state.entries = fresh.into_iter().map(Entry::new).collect();
            } else {
                for record in fresh {
                    state.seen.insert(record.id);
                    state.entries.push(Entry::new(record));
                }
            }

            state.cursor.current_page += 1;
            state.initial_loading = false;
            state.fresh_session = false;
            (serialize_records(&state.entries), appended)
        };
        self.persist(&snapshot);

        tracing::debug!(
            source = self.source.name(),
            page,
            appended,
            "page applied"
        );
        Ok(FetchOutcome::Fetched(appended))
    }

    /// Near-end-of-list signal from the rendering collaborator.
    ///
    /// The sole backpressure mechanism: triggers the next fetch unless one
    /// is already in flight or the cursor is past the last known page.
    /// Transport errors are absorbed; the list simply stops growing until
    /// the next signal.
    pub async fn notify_near_end(&self) -> FetchOutcome {
        if self.fetching.load(Ordering::SeqCst) {
            return FetchOutcome::InFlight;
        }
        if !self.lock_state().cursor.has_more() {
            return FetchOutcome::Exhausted;
        }
        match self.fetch_next_page().await {
            Ok(outcome) => outcome,
            // Already logged in fetch_next_page.
            Err(_) => FetchOutcome::Failed,
        }
    }

    /// Flip edit mode for `id`. Leaving edit mode via toggle drops any
    /// drafts. No-op for an unknown id.
    pub fn toggle_edit(&self, id: u64) {
        let mut state = self.lock_state();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.record.id == id) {
            if entry.editing {
                entry.editing = false;
                entry.draft_name = None;
                entry.draft_description = None;
            } else {
                entry.editing = true;
            }
        }
    }

    /// Set a draft value for `id`. Applied unconditionally, even outside
    /// edit mode; drafts are transient and never persisted. No-op for an
    /// unknown id.
    pub fn update_draft(&self, id: u64, field: DraftField, value: impl Into<String>) {
        let mut state = self.lock_state();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.record.id == id) {
            match field {
                DraftField::Name => entry.draft_name = Some(value.into()),
                DraftField::Description => entry.draft_description = Some(value.into()),
            }
        }
    }

    /// Commit drafts for `id`: a non-empty draft replaces the committed
    /// value, an empty or missing draft leaves it unchanged. Clears edit
    /// state and persists. No-op for an unknown id.
    pub fn commit_edit(&self, id: u64) {
        let snapshot = {
            let mut state = self.lock_state();
            let Some(entry) = state.entries.iter_mut().find(|e| e.record.id == id) else {
                return;
            };
            if let Some(name) = entry.draft_name.take()
                && !name.is_empty()
            {
                entry.record.name = name;
            }
            if let Some(description) = entry.draft_description.take()
                && !description.is_empty()
            {
                entry.record.description = Some(description);
            }
            entry.editing = false;
            serialize_records(&state.entries)
        };
        self.persist(&snapshot);
        tracing::debug!(id, "edit committed");
    }

    /// Remove `id` from the working set and persist. The id also leaves
    /// the dedup set, so a later page containing it may re-add it.
    /// No-op (and no re-persist) for an unknown id; idempotent.
    pub fn delete(&self, id: u64) {
        let snapshot = {
            let mut state = self.lock_state();
            let before = state.entries.len();
            state.entries.retain(|e| e.record.id != id);
            if state.entries.len() == before {
                return;
            }
            state.seen.remove(&id);
            serialize_records(&state.entries)
        };
        self.persist(&snapshot);
        tracing::debug!(id, "entry deleted");
    }

    /// Discard the working set, cursor, and persisted snapshot.
    ///
    /// Bumps the generation so a fetch still in flight discards its
    /// response instead of resurrecting the old set.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.lock_state();
            state.entries.clear();
            state.seen.clear();
            state.cursor = PageCursor::new(self.options.per_page);
            state.initial_loading = true;
            state.fresh_session = true;
        }
        self.persist("[]");
        tracing::debug!("working set reset");
    }

    /// Ordered durable records (a snapshot; transient state excluded).
    pub fn records(&self) -> Vec<RepoRecord> {
        self.lock_state()
            .entries
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Ordered entries including transient editing state (a snapshot).
    pub fn entries(&self) -> Vec<Entry> {
        self.lock_state().entries.clone()
    }

    pub fn cursor(&self) -> PageCursor {
        self.lock_state().cursor
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::SeqCst)
    }

    pub fn is_initial_loading(&self) -> bool {
        self.lock_state().initial_loading
    }

    fn persist(&self, snapshot: &str) {
        if let Err(e) = self.store.save(&self.options.snapshot_key, snapshot) {
            tracing::warn!(error = %e, "failed to persist working set");
        }
    }
}

fn serialize_records(entries: &[Entry]) -> String {
    let records: Vec<&RepoRecord> = entries.iter().map(|e| &e.record).collect();
    serde_json::to_string(&records).unwrap_or_default()
}
