use anyhow::Context;
use request_ledger::{
    error::{LifecycleError, ValidationError},
    history::{self, HistoryAction},
    notify::{Notification, Notifier},
    request::{ItemEdits, ItemPatch, NewItem, RequestDraft, RequestStatus},
    service::RequestService,
    store::RequestFilter,
    utils,
};
use sled::open;
use std::sync::{Arc, Mutex};

use tempfile::tempdir; // Use for test db cleanup.

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(
        &self,
        notification: &Notification,
    ) -> Result<(), request_ledger::error::NotificationError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// Sled uses file-based locking, so every test gets its own database under a
// temp dir which is removed when the guard drops.
fn service() -> anyhow::Result<(tempfile::TempDir, RequestService, Arc<RecordingNotifier>)> {
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join("requests.db"))?;
    let notifier = Arc::new(RecordingNotifier::default());
    let service = RequestService::new(Arc::new(db))?.with_notifier(notifier.clone());
    Ok((temp_dir, service, notifier))
}

fn q3_banners() -> RequestDraft {
    RequestDraft::new()
        .set_requested_by("Ama Mensah")
        .set_title("Q3 Banners")
        .set_description("Banners for the Q3 launch")
        .add_item(NewItem::new("Banner", 10, "launch"))
}

#[test]
fn create_request_starts_pending_with_created_history() -> anyhow::Result<()> {
    let (_dir, service, notifier) = service()?;
    let owner = utils::new_uuid_to_bech32("user_")?;

    let request = service
        .create_request(&owner, q3_banners())
        .context("Request failed on create: ")?;

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.items.len(), 1);
    assert_eq!(request.owner_id, owner);

    let entries = service.list_history(&request.id)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, HistoryAction::Created);
    assert_eq!(entries[0].acted_by, owner);

    // the admin hears about new requests
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "admin");
    assert_eq!(sent[0].subject, "New Request Created");
    assert_eq!(sent[0].kind, HistoryAction::Created);

    Ok(())
}

#[test]
fn modify_adds_item_and_snapshots_the_original() -> anyhow::Result<()> {
    let (_dir, service, notifier) = service()?;
    let owner = utils::new_uuid_to_bech32("user_")?;
    let manager = utils::new_uuid_to_bech32("user_")?;

    let original = service.create_request(&owner, q3_banners())?;

    let modified = service.apply_action(
        &original.id,
        "modified",
        &manager,
        Some("adding flyers".into()),
        ItemEdits::new().add(NewItem::new("Flyer", 50, "launch")),
    )?;

    assert_eq!(modified.items.len(), 2);
    assert_eq!(modified.items[0], original.items[0]);
    assert_eq!(modified.items[1].name, "Flyer");
    // modified is an edit, the status stays where it was
    assert_eq!(modified.status, RequestStatus::Pending);
    assert_eq!(modified.version, original.version + 1);

    let snapshots = service.list_snapshots(&original.id)?;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].original_request_id, original.id);
    assert_eq!(snapshots[0].request, original);
    assert!(snapshots[0].verify()?);

    let entries = service.list_history(&original.id)?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].action, HistoryAction::Modified);
    assert_eq!(entries[1].acted_by, manager);
    assert_eq!(entries[1].notes.as_deref(), Some("adding flyers"));

    // the owner is told about the change
    let last = notifier.sent().pop().unwrap();
    assert_eq!(last.recipient, owner);
    assert_eq!(last.subject, "Request modified");

    Ok(())
}

#[test]
fn approve_sets_status_without_snapshot() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let owner = utils::new_uuid_to_bech32("user_")?;
    let approver = utils::new_uuid_to_bech32("user_")?;

    let request = service.create_request(&owner, q3_banners())?;
    let approved = service
        .apply_action(&request.id, "approved", &approver, None, ItemEdits::new())
        .context("Request failed on approval: ")?;

    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.items, request.items);
    assert!(approved.updated_at >= request.updated_at);
    assert!(service.list_snapshots(&request.id)?.is_empty());

    let actions: Vec<_> = service
        .list_history(&request.id)?
        .iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, [HistoryAction::Created, HistoryAction::Approved]);

    Ok(())
}

#[test]
fn reject_sets_status() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;

    let rejected =
        service.apply_action(&request.id, "rejected", "user_b", Some("no budget".into()), ItemEdits::new())?;

    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.items, request.items);

    Ok(())
}

#[test]
fn unknown_action_is_rejected_without_changes() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;

    let err = service
        .apply_action(&request.id, "archived", "user_b", None, ItemEdits::new())
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Validation(ValidationError::UnknownAction(ref a)) if a == "archived"
    ));
    assert_eq!(service.get_request(&request.id)?, request);
    assert_eq!(service.list_history(&request.id)?.len(), 1);

    Ok(())
}

#[test]
fn action_on_missing_request_is_not_found() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let missing = utils::new_request_id()?;

    let err = service
        .apply_action(&missing, "approved", "user_b", None, ItemEdits::new())
        .unwrap_err();

    assert!(matches!(err, LifecycleError::NotFound(ref id) if *id == missing));
    assert!(service.list_history(&missing)?.is_empty());

    Ok(())
}

#[test]
fn history_of_unknown_request_is_empty() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;

    assert!(service.list_history("req_1nothing")?.is_empty());

    Ok(())
}

#[test]
fn remove_and_update_of_the_same_item_removes_it() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request(
        "user_a",
        q3_banners().add_item(NewItem::new("Poster", 4, "in-store")),
    )?;
    let banner = request.items[0].id.clone();

    let modified = service.apply_action(
        &request.id,
        "modified",
        "user_b",
        None,
        ItemEdits::new()
            .remove(banner.clone())
            .update(ItemPatch::new(banner.clone()).set_quantity(20)),
    )?;

    assert!(modified.item(&banner).is_none());
    assert_eq!(modified.items.len(), 1);
    assert_eq!(modified.items[0].name, "Poster");

    Ok(())
}

#[test]
fn modify_updates_items_in_place() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;
    let banner = request.items[0].id.clone();

    let modified = service.apply_action(
        &request.id,
        "modified",
        "user_b",
        None,
        ItemEdits::new().update(ItemPatch::new(banner.clone()).set_quantity(25)),
    )?;

    let item = modified.item(&banner).unwrap();
    assert_eq!(item.quantity, 25);
    assert_eq!(item.name, "Banner");

    Ok(())
}

#[test]
fn modify_requires_edits_and_keeps_items_non_empty() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;

    let no_edits = service
        .apply_action(&request.id, "modified", "user_b", None, ItemEdits::new())
        .unwrap_err();
    assert!(matches!(
        no_edits,
        LifecycleError::Validation(ValidationError::NoItemEdits)
    ));

    let emptying = service
        .apply_action(
            &request.id,
            "modified",
            "user_b",
            None,
            ItemEdits::new().remove(request.items[0].id.clone()),
        )
        .unwrap_err();
    assert!(matches!(
        emptying,
        LifecycleError::Validation(ValidationError::WouldEmptyItems)
    ));

    // neither attempt left a trace
    assert!(service.list_snapshots(&request.id)?.is_empty());
    assert_eq!(service.list_history(&request.id)?.len(), 1);
    assert_eq!(service.get_request(&request.id)?, request);

    Ok(())
}

#[test]
fn approve_ignores_item_edits() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;

    let approved = service.apply_action(
        &request.id,
        "approved",
        "user_b",
        None,
        ItemEdits::new().add(NewItem::new("Flyer", 1, "launch")),
    )?;

    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.items, request.items);
    assert!(service.list_snapshots(&request.id)?.is_empty());
    assert_eq!(
        service.list_history(&request.id)?.last().map(|e| e.action),
        Some(HistoryAction::Approved)
    );

    Ok(())
}

#[test]
fn blank_actor_is_rejected_before_any_write() -> anyhow::Result<()> {
    let (_dir, service, notifier) = service()?;
    let request = service.create_request("user_a", q3_banners())?;

    for actor in ["", "   "] {
        let err = service
            .apply_action(&request.id, "approved", actor, None, ItemEdits::new())
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::EmptyActor)
        ));
    }

    // checked before the lookup, so even unknown ids report the actor
    assert!(matches!(
        service
            .apply_action("req_missing", "rejected", "", None, ItemEdits::new())
            .unwrap_err(),
        LifecycleError::Validation(ValidationError::EmptyActor)
    ));
    assert!(matches!(
        service.delete_request(&request.id, " ").unwrap_err(),
        LifecycleError::Validation(ValidationError::EmptyActor)
    ));

    assert_eq!(service.get_request(&request.id)?, request);
    assert_eq!(service.list_history(&request.id)?.len(), 1);
    assert_eq!(notifier.sent().len(), 1);

    Ok(())
}

#[test]
fn create_validation_writes_nothing() -> anyhow::Result<()> {
    let (_dir, service, notifier) = service()?;

    let no_items = RequestDraft::new()
        .set_requested_by("Ama")
        .set_title("Empty");
    assert!(matches!(
        service.create_request("user_a", no_items).unwrap_err(),
        LifecycleError::Validation(ValidationError::NoItems)
    ));

    let bad_quantity = q3_banners().add_item(NewItem::new("Flyer", 0, "launch"));
    assert!(matches!(
        service.create_request("user_a", bad_quantity).unwrap_err(),
        LifecycleError::Validation(ValidationError::InvalidItem { field: "quantity" })
    ));

    assert!(matches!(
        service.create_request("", q3_banners()).unwrap_err(),
        LifecycleError::Validation(ValidationError::EmptyOwner)
    ));

    assert!(service.list_requests(&RequestFilter::new())?.is_empty());
    assert!(service.recent_activity(10)?.is_empty());
    assert!(notifier.sent().is_empty());

    Ok(())
}

#[test]
fn full_history_is_append_only_and_well_formed() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;

    let mut seen = service.list_history(&request.id)?;
    let steps = [
        ("modified", ItemEdits::new().add(NewItem::new("Flyer", 50, "launch"))),
        ("rejected", ItemEdits::new()),
        (
            "modified",
            ItemEdits::new().update(ItemPatch::new(request.items[0].id.clone()).set_quantity(5)),
        ),
        ("approved", ItemEdits::new()),
    ];

    for (action, edits) in steps {
        service.apply_action(&request.id, action, "user_b", None, edits)?;
        let now = service.list_history(&request.id)?;

        assert_eq!(now.len(), seen.len() + 1);
        assert_eq!(now[..seen.len()], seen[..]);
        assert!(history::is_well_formed(&now));
        seen = now;
    }

    // one snapshot per modification, each a faithful pre-image
    let snapshots = service.list_snapshots(&request.id)?;
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].request.items.len(), 1);
    assert_eq!(snapshots[1].request.items.len(), 2);
    assert_eq!(snapshots[1].request.status, RequestStatus::Rejected);
    assert!(snapshots[0].version() < snapshots[1].version());

    assert_eq!(service.get_request(&request.id)?.status, RequestStatus::Approved);

    Ok(())
}

#[test]
fn delete_keeps_history_and_snapshots() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;
    service.apply_action(
        &request.id,
        "modified",
        "user_b",
        None,
        ItemEdits::new().add(NewItem::new("Flyer", 50, "launch")),
    )?;

    let removed = service.delete_request(&request.id, "user_b")?;
    assert_eq!(removed.id, request.id);

    assert!(matches!(
        service.get_request(&request.id).unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert!(matches!(
        service.delete_request(&request.id, "user_b").unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert_eq!(service.list_history(&request.id)?.len(), 2);
    assert_eq!(service.list_snapshots(&request.id)?.len(), 1);

    Ok(())
}

#[test]
fn listing_filters_and_summary_counts() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;

    let a = service.create_request("user_a", q3_banners())?;
    let b = service.create_request("user_a", q3_banners().set_title("Q4 Banners"))?;
    let c = service.create_request("user_c", q3_banners().set_title("Shelf talkers"))?;

    service.apply_action(&a.id, "approved", "mgr", None, ItemEdits::new())?;
    service.apply_action(&c.id, "rejected", "mgr", None, ItemEdits::new())?;

    let all = service.list_requests(&RequestFilter::new())?;
    let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, [a.id.as_str(), b.id.as_str(), c.id.as_str()]);

    let owned = service.list_requests(&RequestFilter::new().owned_by("user_a"))?;
    assert_eq!(owned.len(), 2);

    let pending = service.list_requests(&RequestFilter::new().with_status(RequestStatus::Pending))?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);

    let summary = service.request_summary()?;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.modified, 0);

    Ok(())
}

#[test]
fn activity_feed_tracks_changes_newest_first() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let request = service.create_request("user_a", q3_banners())?;
    service.apply_action(&request.id, "approved", "mgr", None, ItemEdits::new())?;
    service.delete_request(&request.id, "mgr")?;

    let feed = service.recent_activity(10)?;
    let descriptions: Vec<_> = feed.iter().map(|e| e.description.as_str()).collect();

    assert_eq!(
        descriptions,
        [
            "Request \"Q3 Banners\" deleted by mgr",
            "Request \"Q3 Banners\" approved by mgr",
            "New request created: Q3 Banners",
        ]
    );
    assert_eq!(feed[2].actor, "Ama Mensah");
    assert!(feed.iter().all(|e| e.kind == "Request Update"));

    Ok(())
}

#[test]
fn concurrent_actions_never_lose_history() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let service = Arc::new(service);
    let request = service.create_request("user_a", q3_banners())?;

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let service = service.clone();
            let id = request.id.clone();
            std::thread::spawn(move || {
                let action = if n % 2 == 0 { "approved" } else { "rejected" };
                service.apply_action(&id, action, &format!("mgr_{n}"), None, ItemEdits::new())
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => applied += 1,
            Err(LifecycleError::Conflict { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }

    // every committed write has exactly one history entry, losers have none
    let stored = service.get_request(&request.id)?;
    assert!(applied >= 1);
    assert_eq!(stored.version, 1 + applied as u64);
    assert_eq!(service.list_history(&request.id)?.len(), 1 + applied);

    Ok(())
}

#[test]
fn concurrent_edits_keep_one_snapshot_per_committed_edit() -> anyhow::Result<()> {
    let (_dir, service, _) = service()?;
    let service = Arc::new(service);
    let request = service.create_request("user_a", q3_banners())?;

    let handles: Vec<_> = (0..6u64)
        .map(|n| {
            let service = service.clone();
            let id = request.id.clone();
            std::thread::spawn(move || {
                let edits = ItemEdits::new().add(NewItem::new(format!("Flyer {n}"), n + 1, "launch"));
                service.apply_action(&id, "modified", &format!("mgr_{n}"), None, edits)
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => applied += 1,
            Err(LifecycleError::Conflict { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }

    // losers leave no pre-image behind
    let stored = service.get_request(&request.id)?;
    let snapshots = service.list_snapshots(&request.id)?;
    assert!(applied >= 1);
    assert_eq!(stored.items.len(), 1 + applied);
    assert_eq!(snapshots.len(), applied);
    for (n, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.version(), 1 + n as u64);
        assert_eq!(snapshot.request.items.len(), 1 + n);
    }

    Ok(())
}
