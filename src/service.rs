//! Service layer API for the request lifecycle
use super::activity::ActivityEntry;
use super::config::{Config, NotifyConfig};
use super::error::{LifecycleError, PersistenceError, ValidationError};
use super::history::{Action, HistoryAction, HistoryEntry};
use super::notify::{Notification, Notifier, TracingNotifier};
use super::request::{ItemEdits, Request, RequestDraft, RequestStatus, TimeStamp};
use super::sled_store::SledStore;
use super::snapshot::Snapshot;
use super::store::{ActivityFeed, HistoryLog, RequestFilter, RequestStore, SnapshotStore};
use super::utils;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The four collections the service writes to.
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn RequestStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub history: Arc<dyn HistoryLog>,
    pub activity: Arc<dyn ActivityFeed>,
}

impl Stores {
    pub fn from_sled(store: Arc<SledStore>) -> Self {
        Self {
            requests: store.clone(),
            snapshots: store.clone(),
            history: store.clone(),
            activity: store,
        }
    }
}

/// Per-status counts over every live request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequestSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub modified: usize,
}

pub struct RequestService {
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    settings: NotifyConfig,
}

impl RequestService {
    /// sled backed service with the logging notifier and default settings.
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, PersistenceError> {
        let store = Arc::new(SledStore::new(instance)?);
        Ok(Self::with_stores(
            Stores::from_sled(store),
            Arc::new(TracingNotifier),
            NotifyConfig::default(),
        ))
    }

    pub fn open(config: &Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let store = SledStore::open(&config.store).with_context(|| {
            format!("failed to open store at {}", config.store.path.display())
        })?;
        Ok(Self::with_stores(
            Stores::from_sled(Arc::new(store)),
            notifier,
            config.notify.clone(),
        ))
    }

    pub fn with_stores(stores: Stores, notifier: Arc<dyn Notifier>, settings: NotifyConfig) -> Self {
        Self {
            stores,
            notifier,
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Load a live request or fail with `NotFound`.
    fn load_request(&self, request_id: &str) -> Result<Request, LifecycleError> {
        self.stores
            .requests
            .find_by_id(request_id)?
            .ok_or_else(|| LifecycleError::NotFound(request_id.to_string()))
    }

    /// Create a new request in `pending` and record its `created` history entry.
    pub fn create_request(
        &self,
        owner_id: &str,
        draft: RequestDraft,
    ) -> Result<Request, LifecycleError> {
        if owner_id.trim().is_empty() {
            return Err(ValidationError::EmptyOwner.into());
        }
        draft.validate()?;

        // Assign ids up front so nothing is written if one fails
        let request_id = utils::new_request_id()?;
        let item_ids = (0..draft.item_count())
            .map(|_| utils::new_item_id())
            .collect::<Result<Vec<_>, _>>()?;
        let request = draft.into_request(request_id, owner_id.to_string(), item_ids);

        // The history entry is only written once the request is stored
        self.stores.requests.save(&request)?;
        self.stores.history.append(&HistoryEntry::new(
            request.id.clone(),
            HistoryAction::Created,
            owner_id.to_string(),
            None,
        ))?;

        info!(request_id = %request.id, owner = %owner_id, "request created");

        self.record_activity(
            format!("New request created: {}", request.title),
            request.requested_by.clone(),
        );
        self.dispatch(self.settings.admin_recipient.clone(), HistoryAction::Created, &request);

        Ok(request)
    }

    /// Approve, reject or modify an existing request.
    ///
    /// `modified` applies `edits` (remove, update, add) and leaves the status
    /// as it was; the pre-image snapshot commits together with the edit.
    /// `approved`/`rejected` set the status, take no snapshot and ignore any
    /// `edits`. Either way exactly one history entry is appended once the
    /// request is written.
    ///
    /// A failed history append does not undo the request write; the new
    /// version stays and the error is returned.
    pub fn apply_action(
        &self,
        request_id: &str,
        action: &str,
        acting_user_id: &str,
        notes: Option<String>,
        edits: ItemEdits,
    ) -> Result<Request, LifecycleError> {
        let action: Action = action.parse()?;
        if acting_user_id.trim().is_empty() {
            return Err(ValidationError::EmptyActor.into());
        }
        match action.target_status() {
            None if edits.is_empty() => return Err(ValidationError::NoItemEdits.into()),
            None => edits.validate()?,
            Some(status) if !edits.is_empty() => {
                debug!(request_id = %request_id, %status, "item edits ignored");
            }
            Some(_) => {}
        }

        let current = self.load_request(request_id)?;

        let updated = match action.target_status() {
            None => self.modify(&current, &edits)?,
            Some(status) => self.stores.requests.update(
                &current.id,
                current.version,
                &mut |request: &mut Request| {
                    request.status = status;
                    request.updated_at = TimeStamp::new();
                },
            )?,
        };

        self.stores.history.append(&HistoryEntry::new(
            updated.id.clone(),
            action.into(),
            acting_user_id.to_string(),
            notes,
        ))?;

        info!(
            request_id = %updated.id,
            action = %HistoryAction::from(action),
            actor = %acting_user_id,
            version = updated.version,
            "request action applied"
        );

        self.record_activity(
            format!(
                "Request \"{}\" {} by {}",
                updated.title,
                HistoryAction::from(action),
                acting_user_id
            ),
            acting_user_id.to_string(),
        );
        self.dispatch(updated.owner_id.clone(), action.into(), &updated);

        Ok(updated)
    }

    /// Item edit, committed together with its pre-image snapshot.
    fn modify(&self, current: &Request, edits: &ItemEdits) -> Result<Request, LifecycleError> {
        let added_ids = edits
            .add
            .iter()
            .map(|_| utils::new_item_id())
            .collect::<Result<Vec<_>, _>>()?;
        let next_items = edits.apply_to(&current.items, added_ids);
        if next_items.is_empty() {
            return Err(ValidationError::WouldEmptyItems.into());
        }

        let (updated, snapshot) = self.stores.requests.update_with_snapshot(
            &current.id,
            current.version,
            &mut |request: &mut Request| {
                request.items = next_items.clone();
                request.updated_at = TimeStamp::new();
            },
        )?;
        debug!(request_id = %updated.id, snapshot_id = %snapshot.id, "pre-image kept");

        Ok(updated)
    }

    /// Every history entry for `request_id`, oldest first. Unknown ids yield an empty list.
    pub fn list_history(&self, request_id: &str) -> Result<Vec<HistoryEntry>, LifecycleError> {
        Ok(self.stores.history.find_by_request(request_id)?)
    }

    /// Every snapshot taken of `request_id`, oldest first.
    pub fn list_snapshots(&self, request_id: &str) -> Result<Vec<Snapshot>, LifecycleError> {
        Ok(self.stores.snapshots.find_by_request(request_id)?)
    }

    pub fn get_request(&self, request_id: &str) -> Result<Request, LifecycleError> {
        self.load_request(request_id)
    }

    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, LifecycleError> {
        Ok(self.stores.requests.find_all(filter)?)
    }

    pub fn request_summary(&self) -> Result<RequestSummary, LifecycleError> {
        let requests = self.stores.requests.find_all(&RequestFilter::new())?;

        let mut summary = RequestSummary {
            total: requests.len(),
            ..RequestSummary::default()
        };
        for request in &requests {
            match request.status {
                RequestStatus::Pending => summary.pending += 1,
                RequestStatus::Approved => summary.approved += 1,
                RequestStatus::Rejected => summary.rejected += 1,
                RequestStatus::Modified => summary.modified += 1,
            }
        }

        Ok(summary)
    }

    /// Remove the live request. Its snapshots and history are kept.
    pub fn delete_request(
        &self,
        request_id: &str,
        acting_user_id: &str,
    ) -> Result<Request, LifecycleError> {
        if acting_user_id.trim().is_empty() {
            return Err(ValidationError::EmptyActor.into());
        }
        let removed = self
            .stores
            .requests
            .remove(request_id)?
            .ok_or_else(|| LifecycleError::NotFound(request_id.to_string()))?;

        info!(request_id = %request_id, actor = %acting_user_id, "request deleted");
        self.record_activity(
            format!("Request \"{}\" deleted by {}", removed.title, acting_user_id),
            acting_user_id.to_string(),
        );

        Ok(removed)
    }

    /// Newest first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, LifecycleError> {
        Ok(self.stores.activity.recent(limit)?)
    }

    // the feed is derived data, a failed write must not fail the caller
    fn record_activity(&self, description: String, actor: String) {
        let entry = ActivityEntry::request_update(description, actor);
        if let Err(err) = self.stores.activity.record(&entry) {
            warn!(error = %err, "failed to record request activity");
        }
    }

    fn dispatch(&self, recipient: String, kind: HistoryAction, request: &Request) {
        let notification = Notification {
            recipient,
            subject: format!(
                "{}{}",
                self.settings.subject_prefix,
                Notification::subject_for(kind)
            ),
            kind,
            request: request.clone(),
            link: self.settings.request_link(&request.id),
        };

        if let Err(err) = self.notifier.notify(&notification) {
            warn!(
                error = %err,
                request_id = %request.id,
                kind = %kind,
                "notification failed"
            );
        }
    }
}
