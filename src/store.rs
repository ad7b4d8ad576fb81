//! Persistence contracts for the request, snapshot, history and activity collections.
//!
//! Every read goes to the backing store. Implementations must be safe to share
//! across threads. The only write that spans two collections is
//! [`RequestStore::update_with_snapshot`], which must be atomic.
use super::activity::ActivityEntry;
use super::error::PersistenceError;
use super::history::HistoryEntry;
use super::request::{Request, RequestStatus};
use super::snapshot::Snapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub owner_id: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.owner_id
            .as_ref()
            .is_none_or(|owner| *owner == request.owner_id)
            && self.status.is_none_or(|status| status == request.status)
    }
}

pub trait RequestStore: Send + Sync {
    /// Inserts a new request. Fails with `Duplicate` if the id is taken.
    fn save(&self, request: &Request) -> Result<String, PersistenceError>;
    fn find_by_id(&self, id: &str) -> Result<Option<Request>, PersistenceError>;
    /// Matching requests ordered by `created_at`, oldest first.
    fn find_all(&self, filter: &RequestFilter) -> Result<Vec<Request>, PersistenceError>;
    /// Applies `mutator` to the stored request if it is still at
    /// `expected_version`, then bumps the version. Fails with `Missing` or
    /// `VersionConflict` otherwise and leaves the document untouched.
    fn update(
        &self,
        id: &str,
        expected_version: u64,
        mutator: &mut dyn FnMut(&mut Request),
    ) -> Result<Request, PersistenceError>;
    /// Same contract as [`RequestStore::update`], but the stored document is
    /// first copied into a [`Snapshot`]. The snapshot and the new version
    /// commit together or not at all, so a snapshot is always the exact
    /// pre-image of a write that happened.
    ///
    /// `mutator` may run more than once if the backend retries.
    fn update_with_snapshot(
        &self,
        id: &str,
        expected_version: u64,
        mutator: &mut dyn FnMut(&mut Request),
    ) -> Result<(Request, Snapshot), PersistenceError>;
    fn remove(&self, id: &str) -> Result<Option<Request>, PersistenceError>;
}

/// Read side of the snapshot collection. Snapshots are only ever written by
/// [`RequestStore::update_with_snapshot`].
pub trait SnapshotStore: Send + Sync {
    /// Oldest first.
    fn find_by_request(&self, request_id: &str) -> Result<Vec<Snapshot>, PersistenceError>;
}

pub trait HistoryLog: Send + Sync {
    fn append(&self, entry: &HistoryEntry) -> Result<(), PersistenceError>;
    /// In append order. Empty for unknown requests.
    fn find_by_request(&self, request_id: &str) -> Result<Vec<HistoryEntry>, PersistenceError>;
}

pub trait ActivityFeed: Send + Sync {
    fn record(&self, entry: &ActivityEntry) -> Result<(), PersistenceError>;
    /// Newest first.
    fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>, PersistenceError>;
}
