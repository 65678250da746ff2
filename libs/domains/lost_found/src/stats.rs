use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Item, ItemStatus};

/// Counters derived from a snapshot, never stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemStats {
    pub total_items: u64,
    pub pending_approval: u64,
    pub approved_items: u64,
    pub lost_items: u64,
    pub found_items: u64,
    /// Distinct returned pairs, not items
    pub returned_items: u64,
    /// Linked items, both sides counted
    pub linked_items: u64,
    /// Open lost and found reports
    pub active_searches: u64,
}

/// Unordered key of a linked pair.
pub fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

impl ItemStats {
    pub fn compute(items: &[Item]) -> Self {
        let mut stats = Self::default();
        let mut pairs = HashSet::new();

        for item in items {
            stats.total_items += 1;
            if item.is_approved {
                stats.approved_items += 1;
            } else {
                stats.pending_approval += 1;
            }
            match item.status {
                ItemStatus::Lost => stats.lost_items += 1,
                ItemStatus::Found => stats.found_items += 1,
                ItemStatus::Returned => {}
            }
            if item.is_linked {
                stats.linked_items += 1;
            }
            if let (ItemStatus::Returned, true, Some(other)) =
                (item.status, item.is_linked, item.linked_item_id)
            {
                pairs.insert(pair_key(item.id, other));
            }
        }

        stats.returned_items = pairs.len() as u64;
        stats.active_searches = stats.lost_items + stats.found_items;
        stats
    }
}
