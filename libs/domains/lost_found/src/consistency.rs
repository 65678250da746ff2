//! Link consistency check.
//!
//! Links are written as two sequential updates, so a failure between them can
//! leave one side linked. The check finds such items and [`repair_plan`]
//! rolls each one back to its unlinked role state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Item, ItemStatus, ItemUpdate};
use crate::snapshot::ItemSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// `is_linked` disagrees with `linked_item_id`
    FlagMismatch,
    /// Counterpart does not exist
    DanglingLink,
    /// Counterpart does not point back
    OneSidedLink,
    /// Both or neither side carries `original_lost_item_id`
    AmbiguousRoles,
    /// `returned` without a link
    ReturnedWithoutLink,
    /// Linked but not `returned`
    LinkedNotReturned,
    /// `original_lost_item_id` on an item that is not the found side
    MisplacedOriginalLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyIssue {
    pub item_id: Uuid,
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyReport {
    pub checked: u64,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    /// Distinct affected item ids in report order.
    pub fn affected_items(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.issues
            .iter()
            .filter(|issue| seen.insert(issue.item_id))
            .map(|issue| issue.item_id)
            .collect()
    }
}

fn issues_for(item: &Item, snapshot: &ItemSnapshot) -> Vec<ConsistencyIssue> {
    let mut issues = Vec::new();
    let mut push = |kind, counterpart_id| {
        issues.push(ConsistencyIssue {
            item_id: item.id,
            kind,
            counterpart_id,
        })
    };

    if item.is_linked != item.linked_item_id.is_some() {
        push(IssueKind::FlagMismatch, item.linked_item_id);
    }

    if let Some(counterpart_id) = item.linked_item_id {
        match snapshot.find(counterpart_id) {
            None => push(IssueKind::DanglingLink, Some(counterpart_id)),
            Some(other) if other.linked_item_id != Some(item.id) => {
                push(IssueKind::OneSidedLink, Some(counterpart_id))
            }
            Some(other) => {
                let this_side = item.original_lost_item_id == Some(counterpart_id);
                let other_side = other.original_lost_item_id == Some(item.id);
                if this_side == other_side {
                    push(IssueKind::AmbiguousRoles, Some(counterpart_id));
                }
            }
        }
    }

    let fully_linked = item.is_linked && item.linked_item_id.is_some();
    if item.status == ItemStatus::Returned && !fully_linked {
        push(IssueKind::ReturnedWithoutLink, item.linked_item_id);
    }
    if fully_linked && item.status != ItemStatus::Returned {
        push(IssueKind::LinkedNotReturned, item.linked_item_id);
    }

    match item.original_lost_item_id {
        Some(lost_id) if item.linked_item_id != Some(lost_id) => {
            push(IssueKind::MisplacedOriginalLost, Some(lost_id))
        }
        _ => {}
    }

    issues
}

/// Check every item of an admin snapshot.
pub fn check_consistency(snapshot: &ItemSnapshot) -> ConsistencyReport {
    ConsistencyReport {
        checked: snapshot.len() as u64,
        issues: snapshot
            .items
            .iter()
            .flat_map(|item| issues_for(item, snapshot))
            .collect(),
    }
}

/// One rollback per affected item: clear the link fields and restore the
/// role status (found side stays `found`, anything else becomes `lost`).
pub fn repair_plan(snapshot: &ItemSnapshot, report: &ConsistencyReport) -> Vec<(Uuid, ItemUpdate)> {
    report
        .affected_items()
        .into_iter()
        .filter_map(|id| snapshot.find(id))
        .map(|item| (item.id, ItemUpdate::reset_to(item.unlinked_status())))
        .collect()
}
