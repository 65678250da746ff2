use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{Item, ItemFilter};
use crate::repository::newest_first;
use crate::stats::ItemStats;

/// Which items a snapshot was fetched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum View {
    /// Every item
    Admin,
    /// Approved items only
    Public,
}

/// Items as read from storage, newest first.
///
/// Engine operations validate against a snapshot and hand back a fresh one;
/// a snapshot is never modified in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemSnapshot {
    pub view: View,
    pub items: Vec<Item>,
}

impl ItemSnapshot {
    pub fn new(view: View, items: Vec<Item>) -> Self {
        Self { view, items }
    }

    pub fn find(&self, id: Uuid) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn require(&self, id: Uuid) -> LifecycleResult<&Item> {
        self.find(id).ok_or(LifecycleError::ItemNotFound(id))
    }

    /// Found items that may be linked to `lost_id`.
    pub fn candidates_for(&self, lost_id: Uuid) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| item.is_link_candidate_for(lost_id))
            .cloned()
            .collect()
    }

    pub fn filter(&self, filter: &ItemFilter) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    /// Copy of this snapshot with `written` items replacing their old
    /// versions and `removed` items dropped. Items the view cannot see are
    /// left out.
    pub fn with_changes(&self, written: &[Item], removed: &[Uuid]) -> Self {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|item| !removed.contains(&item.id))
            .filter(|item| !written.iter().any(|w| w.id == item.id))
            .cloned()
            .collect();
        items.extend(
            written
                .iter()
                .filter(|item| !removed.contains(&item.id))
                .filter(|item| self.view == View::Admin || item.is_approved)
                .cloned(),
        );
        newest_first(&mut items);
        Self::new(self.view, items)
    }

    pub fn stats(&self) -> ItemStats {
        ItemStats::compute(&self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Refreshed snapshot plus its statistics, returned by every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Outcome {
    pub snapshot: ItemSnapshot,
    pub stats: ItemStats,
    /// Set when the read-back after a committed write failed and `snapshot`
    /// is the caller's snapshot with the written items patched in.
    #[serde(default)]
    pub stale: bool,
}

impl Outcome {
    pub fn stale(snapshot: ItemSnapshot) -> Self {
        Self {
            stale: true,
            ..Self::from(snapshot)
        }
    }
}

impl From<ItemSnapshot> for Outcome {
    fn from(snapshot: ItemSnapshot) -> Self {
        let stats = snapshot.stats();
        Self {
            snapshot,
            stats,
            stale: false,
        }
    }
}
