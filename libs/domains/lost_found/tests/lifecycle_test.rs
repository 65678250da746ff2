//! Lifecycle scenarios against the in-memory repositories

use chrono::Utc;
use domain_lost_found::{
    AdminContext, AdminService, Category, CreateItem, InMemoryAdminRepository,
    InMemoryItemRepository, Item, ItemRepository, ItemStatus, ItemUpdate, LifecycleEngine,
    LifecycleError, Principal, StatusChange, View,
};
use test_utils::{TestDataBuilder, assertions::*};
use uuid::Uuid;

struct Harness {
    engine: LifecycleEngine<InMemoryItemRepository>,
    repo: InMemoryItemRepository,
    admin: AdminContext,
    reporter: Principal,
}

async fn setup(test_name: &str) -> Harness {
    let data = TestDataBuilder::from_test_name(test_name);
    let repo = InMemoryItemRepository::new();
    let engine = LifecycleEngine::new(repo.clone());

    let admins = AdminService::new(InMemoryAdminRepository::new());
    let admin_email = data.email("admin");
    admins.bootstrap(&[admin_email.clone()]).await.unwrap();
    let admin = admins
        .authorize(&Principal::new(data.uid("admin"), &admin_email, "Admin"))
        .await
        .unwrap();

    Harness {
        engine,
        repo,
        admin,
        reporter: Principal::new(data.uid("reporter"), &data.email("reporter"), "Reporter"),
    }
}

impl Harness {
    async fn report(&self, name: &str, status: ItemStatus, approved: bool) -> Item {
        let item = self
            .engine
            .report_item(
                &self.reporter,
                CreateItem {
                    name: name.to_string(),
                    category: Category::Electronics,
                    status,
                    location: "Library".to_string(),
                    date: Utc::now().date_naive(),
                    description: String::new(),
                    contact: String::new(),
                    image_url: None,
                },
            )
            .await
            .unwrap();

        if approved {
            let snapshot = self.engine.snapshot(View::Admin).await.unwrap();
            self.engine
                .approve(&self.admin, &snapshot, item.id)
                .await
                .unwrap();
        }
        self.get(item.id).await
    }

    async fn get(&self, id: Uuid) -> Item {
        assert_some(self.repo.get_by_id(id).await.unwrap(), "stored item")
    }

    async fn link(&self, lost: Uuid, found: Uuid) -> Result<(), LifecycleError> {
        let snapshot = self.engine.snapshot(View::Admin).await?;
        self.engine.link(&self.admin, &snapshot, lost, found).await?;
        Ok(())
    }

    async fn unlink(&self, id: Uuid) -> Result<(), LifecycleError> {
        let snapshot = self.engine.snapshot(View::Admin).await?;
        self.engine.unlink(&self.admin, &snapshot, id).await?;
        Ok(())
    }

    async fn assert_link_flags_agree(&self) {
        for item in self.repo.list_all().await.unwrap() {
            assert_eq!(
                item.is_linked,
                item.linked_item_id.is_some(),
                "is_linked disagrees with linked_item_id on {}",
                item.id
            );
        }
    }
}

// ============================================================================
// Linking
// ============================================================================

#[tokio::test]
async fn test_link_marks_both_sides_returned() {
    let h = setup("test_link_marks_both_sides_returned").await;
    let a = h.report("Phone", ItemStatus::Lost, true).await;
    let b = h.report("Phone", ItemStatus::Found, true).await;

    h.link(a.id, b.id).await.unwrap();

    let a = h.get(a.id).await;
    let b = h.get(b.id).await;
    assert_eq!(a.status, ItemStatus::Returned);
    assert!(a.is_linked);
    assert_eq!(a.linked_item_id, Some(b.id));
    assert_eq!(a.original_lost_item_id, None);
    assert_eq!(b.status, ItemStatus::Returned);
    assert!(b.is_linked);
    assert_eq!(b.linked_item_id, Some(a.id));
    assert_uuid_eq(
        assert_some(b.original_lost_item_id, "found side carries lost id"),
        a.id,
        "original_lost_item_id",
    );
    h.assert_link_flags_agree().await;
}

#[tokio::test]
async fn test_unlink_from_found_side() {
    let h = setup("test_unlink_from_found_side").await;
    let a = h.report("Keys", ItemStatus::Lost, true).await;
    let b = h.report("Keys", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();

    h.unlink(b.id).await.unwrap();

    let a = h.get(a.id).await;
    let b = h.get(b.id).await;
    assert_eq!(a.status, ItemStatus::Lost);
    assert!(!a.is_linked);
    assert_eq!(a.linked_item_id, None);
    assert_eq!(b.status, ItemStatus::Found);
    assert!(!b.is_linked);
    assert_eq!(b.original_lost_item_id, None);
    h.assert_link_flags_agree().await;
}

#[tokio::test]
async fn test_unlink_from_lost_side_resolves_same_roles() {
    let h = setup("test_unlink_from_lost_side_resolves_same_roles").await;
    let a = h.report("Glasses", ItemStatus::Lost, true).await;
    let b = h.report("Glasses", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();

    h.unlink(a.id).await.unwrap();

    assert_eq!(h.get(a.id).await.status, ItemStatus::Lost);
    assert_eq!(h.get(b.id).await.status, ItemStatus::Found);
}

#[tokio::test]
async fn test_link_then_unlink_restores_items() {
    let h = setup("test_link_then_unlink_restores_items").await;
    let a = h.report("Jacket", ItemStatus::Lost, true).await;
    let b = h.report("Jacket", ItemStatus::Found, true).await;

    h.link(a.id, b.id).await.unwrap();
    h.unlink(a.id).await.unwrap();

    assert_eq!(h.get(a.id).await, a);
    assert_eq!(h.get(b.id).await, b);
}

#[tokio::test]
async fn test_link_with_linked_counterpart_leaves_state_unchanged() {
    let h = setup("test_link_with_linked_counterpart_leaves_state_unchanged").await;
    let a = h.report("Bag", ItemStatus::Lost, true).await;
    let b = h.report("Bag", ItemStatus::Found, true).await;
    let c = h.report("Other bag", ItemStatus::Lost, true).await;
    let spare = h.report("Spare bag", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();

    let before = h.repo.list_all().await.unwrap();
    let result = h.link(c.id, b.id).await;

    assert!(matches!(result, Err(LifecycleError::NotEligible { id, .. }) if id == b.id));
    assert_eq!(h.repo.list_all().await.unwrap(), before);
    assert_eq!(h.get(spare.id).await, spare);
}

#[tokio::test]
async fn test_link_rejects_unapproved_found_and_non_lost() {
    let h = setup("test_link_rejects_unapproved_found_and_non_lost").await;
    let lost = h.report("Watch", ItemStatus::Lost, true).await;
    let approved_found = h.report("Watch", ItemStatus::Found, true).await;
    let pending_found = h.report("Watch strap", ItemStatus::Found, false).await;

    let unapproved = h.link(lost.id, pending_found.id).await;
    assert!(matches!(unapproved, Err(LifecycleError::NotEligible { .. })));

    let not_lost = h.link(approved_found.id, lost.id).await;
    assert!(matches!(not_lost, Err(LifecycleError::NotEligible { id, .. }) if id == approved_found.id));
}

#[tokio::test]
async fn test_link_without_any_candidate() {
    let h = setup("test_link_without_any_candidate").await;
    let lost = h.report("Ruler", ItemStatus::Lost, true).await;
    let pending = h.report("Ruler", ItemStatus::Found, false).await;

    let result = h.link(lost.id, pending.id).await;
    assert!(matches!(result, Err(LifecycleError::NoCandidates(id)) if id == lost.id));
}

#[tokio::test]
async fn test_unlink_requires_link() {
    let h = setup("test_unlink_requires_link").await;
    let lost = h.report("Pencil case", ItemStatus::Lost, true).await;

    let result = h.unlink(lost.id).await;
    assert!(matches!(result, Err(LifecycleError::NotLinked(_))));
}

// ============================================================================
// Snapshots that predate another admin's write
// ============================================================================

#[tokio::test]
async fn test_link_from_outdated_snapshot_is_rejected() {
    let h = setup("test_link_from_outdated_snapshot_is_rejected").await;
    let a1 = h.report("Headphones", ItemStatus::Lost, true).await;
    let a2 = h.report("Headphones", ItemStatus::Lost, true).await;
    let b = h.report("Headphones", ItemStatus::Found, true).await;
    let outdated = h.engine.snapshot(View::Admin).await.unwrap();

    h.link(a1.id, b.id).await.unwrap();
    let result = h.engine.link(&h.admin, &outdated, a2.id, b.id).await;

    assert!(matches!(result, Err(LifecycleError::NotEligible { id, .. }) if id == b.id));
    assert_eq!(h.get(b.id).await.linked_item_id, Some(a1.id));
    assert_eq!(h.get(a2.id).await, a2);
    let current = h.engine.snapshot(View::Admin).await.unwrap();
    assert!(h.engine.check_consistency(&current).unwrap().is_consistent());
}

#[tokio::test]
async fn test_unlink_from_outdated_snapshot_keeps_newer_link() {
    let h = setup("test_unlink_from_outdated_snapshot_keeps_newer_link").await;
    let a = h.report("Lunchbox", ItemStatus::Lost, true).await;
    let b = h.report("Lunchbox", ItemStatus::Found, true).await;
    let c = h.report("Lunchbox", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();
    let outdated = h.engine.snapshot(View::Admin).await.unwrap();

    h.unlink(a.id).await.unwrap();
    h.link(a.id, c.id).await.unwrap();
    let result = h.engine.unlink(&h.admin, &outdated, b.id).await;

    assert!(matches!(result, Err(LifecycleError::NotLinked(id)) if id == b.id));
    let a = h.get(a.id).await;
    assert_eq!(a.status, ItemStatus::Returned);
    assert_eq!(a.linked_item_id, Some(c.id));
    h.assert_link_flags_agree().await;
}

#[tokio::test]
async fn test_delete_from_outdated_snapshot_keeps_newer_link() {
    let h = setup("test_delete_from_outdated_snapshot_keeps_newer_link").await;
    let a = h.report("Compass", ItemStatus::Lost, true).await;
    let b = h.report("Compass", ItemStatus::Found, true).await;
    let c = h.report("Compass", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();
    let outdated = h.engine.snapshot(View::Admin).await.unwrap();

    h.unlink(a.id).await.unwrap();
    h.link(a.id, c.id).await.unwrap();
    let result = h.engine.delete(&h.admin, &outdated, b.id).await;

    assert!(matches!(result, Err(LifecycleError::StaleSnapshot(id)) if id == b.id));
    assert_eq!(h.get(b.id).await.status, ItemStatus::Found);
    assert_eq!(h.get(a.id).await.linked_item_id, Some(c.id));
}

// ============================================================================
// Status transitions
// ============================================================================

#[tokio::test]
async fn test_lost_to_returned_offers_candidates() {
    let h = setup("test_lost_to_returned_offers_candidates").await;
    let lost = h.report("Cap", ItemStatus::Lost, true).await;
    let found = h.report("Cap", ItemStatus::Found, true).await;
    let snapshot = h.engine.snapshot(View::Admin).await.unwrap();

    let change = h
        .engine
        .change_status(&h.admin, &snapshot, lost.id, ItemStatus::Returned)
        .await
        .unwrap();

    match change {
        StatusChange::CounterpartRequired { item_id, candidates } => {
            assert_eq!(item_id, lost.id);
            assert_eq!(candidates, vec![found]);
        }
        other => panic!("expected candidates, got {:?}", other),
    }
    assert_eq!(h.get(lost.id).await.status, ItemStatus::Lost);
}

#[tokio::test]
async fn test_lost_to_found_is_applied_when_requested() {
    let h = setup("test_lost_to_found_is_applied_when_requested").await;
    let item = h.report("Mug", ItemStatus::Lost, true).await;
    let snapshot = h.engine.snapshot(View::Admin).await.unwrap();

    let change = h
        .engine
        .change_status(&h.admin, &snapshot, item.id, ItemStatus::Found)
        .await
        .unwrap();

    let StatusChange::Applied(outcome) = change else {
        panic!("expected applied change");
    };
    assert_eq!(outcome.stats.found_items, 1);
    assert_eq!(h.get(item.id).await.status, ItemStatus::Found);

    let menu = h.engine.transition_menu(&outcome.snapshot, item.id).unwrap();
    assert!(menu.allowed.is_empty());
}

#[tokio::test]
async fn test_returned_item_cannot_be_edited_back() {
    let h = setup("test_returned_item_cannot_be_edited_back").await;
    let a = h.report("Lunchbox", ItemStatus::Lost, true).await;
    let b = h.report("Lunchbox", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();
    let snapshot = h.engine.snapshot(View::Admin).await.unwrap();

    let result = h
        .engine
        .change_status(&h.admin, &snapshot, a.id, ItemStatus::Lost)
        .await;
    assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
}

// ============================================================================
// Approval, deletion and statistics
// ============================================================================

#[tokio::test]
async fn test_approval_is_monotonic_and_public_view_follows() {
    let h = setup("test_approval_is_monotonic_and_public_view_follows").await;
    let item = h.report("Notebook", ItemStatus::Found, false).await;

    let public = h.engine.snapshot(View::Public).await.unwrap();
    assert!(public.is_empty());

    let admin_snapshot = h.engine.snapshot(View::Admin).await.unwrap();
    let first = h
        .engine
        .approve(&h.admin, &admin_snapshot, item.id)
        .await
        .unwrap();
    let second = h
        .engine
        .approve(&h.admin, &first.snapshot, item.id)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second.stats.pending_approval, 0);
    assert_eq!(h.engine.snapshot(View::Public).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_outcome_keeps_callers_view() {
    let h = setup("test_outcome_keeps_callers_view").await;
    let item = h.report("Badge", ItemStatus::Lost, false).await;
    h.report("Visible", ItemStatus::Lost, true).await;

    let admin_snapshot = h.engine.snapshot(View::Admin).await.unwrap();
    let public_snapshot = h.engine.snapshot(View::Public).await.unwrap();
    let outcome = h
        .engine
        .delete(&h.admin, &public_snapshot, item.id)
        .await
        .unwrap();

    assert_eq!(outcome.snapshot.view, View::Public);
    assert_eq!(outcome.stats.total_items, 1);
    assert_eq!(admin_snapshot.len(), 2, "caller snapshot untouched");
}

#[tokio::test]
async fn test_delete_linked_item_resets_counterpart() {
    let h = setup("test_delete_linked_item_resets_counterpart").await;
    let a = h.report("Charger", ItemStatus::Lost, true).await;
    let b = h.report("Charger", ItemStatus::Found, true).await;
    h.link(a.id, b.id).await.unwrap();
    let snapshot = h.engine.snapshot(View::Admin).await.unwrap();

    let outcome = h.engine.delete(&h.admin, &snapshot, b.id).await.unwrap();

    assert!(h.repo.get_by_id(b.id).await.unwrap().is_none());
    let a = h.get(a.id).await;
    assert_eq!(a.status, ItemStatus::Lost);
    assert!(!a.is_linked);
    assert_eq!(outcome.stats.returned_items, 0);
    assert!(h.engine.check_consistency(&outcome.snapshot).unwrap().is_consistent());
}

#[tokio::test]
async fn test_delete_absent_item_succeeds() {
    let h = setup("test_delete_absent_item_succeeds").await;
    let snapshot = h.engine.snapshot(View::Admin).await.unwrap();

    let outcome = h
        .engine
        .delete(&h.admin, &snapshot, Uuid::now_v7())
        .await
        .unwrap();
    assert!(outcome.snapshot.is_empty());
}

#[tokio::test]
async fn test_returned_counts_distinct_pairs() {
    let h = setup("test_returned_counts_distinct_pairs").await;
    let a = h.report("Ball", ItemStatus::Lost, true).await;
    let b = h.report("Ball", ItemStatus::Found, true).await;
    let c = h.report("Racket", ItemStatus::Lost, true).await;
    let d = h.report("Racket", ItemStatus::Found, true).await;
    h.report("Shoe", ItemStatus::Lost, false).await;
    h.link(a.id, b.id).await.unwrap();
    h.link(c.id, d.id).await.unwrap();

    let stats = h.engine.snapshot(View::Admin).await.unwrap().stats();
    assert_eq!(stats.total_items, 5);
    assert_eq!(stats.pending_approval, 1);
    assert_eq!(stats.linked_items, 4);
    assert_eq!(stats.returned_items, 2);
    assert!(stats.returned_items <= stats.linked_items / 2);
    assert_eq!(stats.active_searches, 1);
}

// ============================================================================
// Consistency repair
// ============================================================================

#[tokio::test]
async fn test_repair_rolls_back_half_written_link() {
    let h = setup("test_repair_rolls_back_half_written_link").await;
    let a = h.report("Tablet", ItemStatus::Lost, true).await;
    let b = h.report("Tablet", ItemStatus::Found, true).await;

    // Only the first write of a link landed
    h.repo
        .update(a.id, ItemUpdate::link_lost_side(b.id))
        .await
        .unwrap();

    let snapshot = h.engine.snapshot(View::Admin).await.unwrap();
    let report = h.engine.check_consistency(&snapshot).unwrap();
    assert_eq!(report.affected_items(), vec![a.id]);

    let repaired = h
        .engine
        .repair_consistency(&h.admin, &snapshot)
        .await
        .unwrap();

    assert_eq!(repaired.repaired, vec![a.id]);
    assert_eq!(h.get(a.id).await, a);
    assert!(
        h.engine
            .check_consistency(&repaired.outcome.snapshot)
            .unwrap()
            .is_consistent()
    );

    // The pairing can now be established cleanly
    h.link(a.id, b.id).await.unwrap();
    h.assert_link_flags_agree().await;
}
