//! Lifecycle & linking engine

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::admin::AdminContext;
use crate::consistency::{self, ConsistencyReport};
use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::{self, TransitionRule};
use crate::models::{CreateItem, Item, ItemStatus, ItemUpdate, NewItem, Principal};
use crate::repository::ItemRepository;
use crate::snapshot::{ItemSnapshot, Outcome, View};

pub const DEFAULT_EARLIEST_OCCURRENCE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2025, 1, 1) {
    Some(date) => date,
    None => NaiveDate::MIN,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Reports may not describe anything that happened before this day
    pub earliest_occurrence_date: NaiveDate,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            earliest_occurrence_date: DEFAULT_EARLIEST_OCCURRENCE_DATE,
        }
    }
}

/// Result of asking for a status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StatusChange {
    Applied(Outcome),
    /// `lost -> returned` needs a found item to link with
    CounterpartRequired { item_id: Uuid, candidates: Vec<Item> },
}

/// Status edits offered for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransitionMenu {
    pub item_id: Uuid,
    pub status: ItemStatus,
    pub allowed: Vec<ItemStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RepairOutcome {
    /// Items rolled back to their unlinked state
    pub repaired: Vec<Uuid>,
    pub outcome: Outcome,
}

/// Ids with an operation in flight in this process.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<Uuid>>>);

impl InFlight {
    fn acquire(&self, ids: &[Uuid]) -> LifecycleResult<InFlightGuard> {
        let mut busy = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = ids.iter().find(|id| busy.contains(id)) {
            return Err(LifecycleError::OperationInProgress(*id));
        }
        busy.extend(ids.iter().copied());

        Ok(InFlightGuard {
            registry: self.clone(),
            ids: ids.to_vec(),
        })
    }
}

/// Releases its ids when dropped, whether the operation succeeded or not.
struct InFlightGuard {
    registry: InFlight,
    ids: Vec<Uuid>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut busy = self.registry.0.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            busy.remove(id);
        }
    }
}

/// Item lifecycle operations.
///
/// Mutations validate against the caller's snapshot, take the in-flight guard,
/// re-check against the stored records, write through the repository and
/// return a refreshed snapshot of the same view. On error the caller keeps
/// its snapshot.
pub struct LifecycleEngine<R: ItemRepository> {
    repository: Arc<R>,
    config: LifecycleConfig,
    in_flight: InFlight,
}

impl<R: ItemRepository> Clone for LifecycleEngine<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            config: self.config.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<R: ItemRepository> LifecycleEngine<R> {
    pub fn new(repository: R) -> Self {
        Self::with_config(repository, LifecycleConfig::default())
    }

    pub fn with_config(repository: R, config: LifecycleConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            config,
            in_flight: InFlight::default(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Fetch the items visible in `view`.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, view: View) -> LifecycleResult<ItemSnapshot> {
        let items = match view {
            View::Admin => self.repository.list_all().await?,
            View::Public => self.repository.list_approved().await?,
        };
        Ok(ItemSnapshot::new(view, items))
    }

    async fn refresh(&self, view: View) -> LifecycleResult<Outcome> {
        Ok(Outcome::from(self.snapshot(view).await?))
    }

    /// Read back after committed writes. The writes stand even if the read
    /// fails, so fall back to the caller's snapshot with the changes applied.
    async fn settle(&self, snapshot: &ItemSnapshot, written: &[Item], removed: &[Uuid]) -> Outcome {
        match self.refresh(snapshot.view).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    view = %snapshot.view,
                    error = %e,
                    "Read-back after write failed, returning patched snapshot"
                );
                Outcome::stale(snapshot.with_changes(written, removed))
            }
        }
    }

    /// Current stored version of an item held by the in-flight guard.
    async fn reload(&self, id: Uuid) -> LifecycleResult<Item> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(LifecycleError::ItemNotFound(id))
    }

    async fn resolve(&self, snapshot: &ItemSnapshot, id: Uuid) -> LifecycleResult<Option<Item>> {
        match snapshot.find(id) {
            Some(item) => Ok(Some(item.clone())),
            None => self.repository.get_by_id(id).await,
        }
    }

    /// Two dependent writes. A failure of the second one is a partial write.
    async fn write_pair(
        &self,
        (first_id, first): (Uuid, ItemUpdate),
        (second_id, second): (Uuid, ItemUpdate),
    ) -> LifecycleResult<[Item; 2]> {
        let first = self.repository.update(first_id, first).await?;

        match self.repository.update(second_id, second).await {
            Ok(second) => Ok([first, second]),
            Err(e) => {
                tracing::error!(
                    updated = %first_id,
                    failed = %second_id,
                    error = %e,
                    "Second write of a paired update failed"
                );
                Err(LifecycleError::PartialWrite {
                    completed: vec![first_id],
                    failed: second_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn ensure_lost_side(lost: &Item) -> LifecycleResult<()> {
        if lost.status != ItemStatus::Lost || lost.is_linked {
            return Err(LifecycleError::NotEligible {
                id: lost.id,
                reason: "only unlinked lost items can be linked",
            });
        }
        Ok(())
    }

    fn ensure_linkable(lost: &Item, found: &Item) -> LifecycleResult<()> {
        Self::ensure_lost_side(lost)?;
        if found.id == lost.id {
            return Err(LifecycleError::NotEligible {
                id: found.id,
                reason: "an item cannot be linked to itself",
            });
        }

        let rejection = if found.status != ItemStatus::Found {
            Some("counterpart must be a found item")
        } else if !found.is_approved {
            Some("counterpart must be approved")
        } else if found.is_linked {
            Some("counterpart is already linked")
        } else {
            None
        };
        match rejection {
            Some(reason) => Err(LifecycleError::NotEligible { id: found.id, reason }),
            None => Ok(()),
        }
    }

    /// Create an unapproved, unlinked report for `reporter`.
    #[instrument(skip(self, reporter, input), fields(user_id = %reporter.uid, item_name = %input.name))]
    pub async fn report_item(&self, reporter: &Principal, input: CreateItem) -> LifecycleResult<Item> {
        input
            .validate()
            .map_err(|e| LifecycleError::Validation(e.to_string()))?;

        if input.status == ItemStatus::Returned {
            return Err(LifecycleError::Validation(
                "items are reported as lost or found".to_string(),
            ));
        }

        let name = input.name.trim();
        let location = input.location.trim();
        if name.is_empty() || location.is_empty() {
            return Err(LifecycleError::Validation(
                "name and location must not be blank".to_string(),
            ));
        }

        let earliest = self.config.earliest_occurrence_date;
        let today = Utc::now().date_naive();
        if input.date < earliest || input.date > today {
            return Err(LifecycleError::Validation(format!(
                "date must be between {earliest} and {today}"
            )));
        }

        let contact = match input.contact.trim() {
            "" => reporter.email.clone(),
            contact => contact.to_string(),
        };

        self.repository
            .create(NewItem {
                name: name.to_string(),
                category: input.category,
                status: input.status,
                location: location.to_string(),
                date: input.date,
                description: input.description.trim().to_string(),
                contact,
                image_url: input.image_url,
                reporter: reporter.clone(),
            })
            .await
    }

    /// Approve an item. Approving twice writes nothing.
    #[instrument(skip(self, ctx, snapshot), fields(admin = %ctx.email()))]
    pub async fn approve(
        &self,
        ctx: &AdminContext,
        snapshot: &ItemSnapshot,
        id: Uuid,
    ) -> LifecycleResult<Outcome> {
        let item = snapshot.require(id)?;
        let _guard = self.in_flight.acquire(&[id])?;

        if item.is_approved {
            tracing::debug!(item_id = %id, "Item already approved");
            return self.refresh(snapshot.view).await;
        }

        let approved = self.repository.update(id, ItemUpdate::approve()).await?;
        tracing::info!(item_id = %id, "Item approved");

        Ok(self.settle(snapshot, &[approved], &[]).await)
    }

    /// Hard delete. A linked counterpart is reset to its unlinked role first.
    #[instrument(skip(self, ctx, snapshot), fields(admin = %ctx.email()))]
    pub async fn delete(
        &self,
        ctx: &AdminContext,
        snapshot: &ItemSnapshot,
        id: Uuid,
    ) -> LifecycleResult<Outcome> {
        let Some(item) = self.resolve(snapshot, id).await? else {
            tracing::debug!(item_id = %id, "Item already absent");
            return self.refresh(snapshot.view).await;
        };

        let counterpart_id = item.linked_item_id.filter(|other| *other != id);
        let mut ids = vec![id];
        ids.extend(counterpart_id);
        let _guard = self.in_flight.acquire(&ids)?;

        let Some(current) = self.repository.get_by_id(id).await? else {
            tracing::debug!(item_id = %id, "Item deleted concurrently");
            return self.refresh(snapshot.view).await;
        };
        if current.linked_item_id != item.linked_item_id {
            return Err(LifecycleError::StaleSnapshot(id));
        }

        let mut reset = None;
        if let Some(other_id) = counterpart_id {
            let counterpart = self.repository.get_by_id(other_id).await?;
            if let Some(other) = counterpart.filter(|other| other.linked_item_id == Some(id)) {
                let status = other.unlinked_status();
                let other = self
                    .repository
                    .update(other_id, ItemUpdate::reset_to(status))
                    .await?;
                tracing::info!(item_id = %other_id, status = %status, "Counterpart unlinked before delete");
                reset = Some(other);
            }
        }

        if let Err(e) = self.repository.delete(id).await {
            return Err(match reset {
                Some(other) => LifecycleError::PartialWrite {
                    completed: vec![other.id],
                    failed: id,
                    reason: e.to_string(),
                },
                None => e,
            });
        }
        tracing::info!(item_id = %id, "Item deleted");

        let written: Vec<Item> = reset.into_iter().collect();
        Ok(self.settle(snapshot, &written, &[id]).await)
    }

    /// Apply a bare status edit according to the transition table.
    #[instrument(skip(self, ctx, snapshot), fields(admin = %ctx.email()))]
    pub async fn change_status(
        &self,
        ctx: &AdminContext,
        snapshot: &ItemSnapshot,
        id: Uuid,
        to: ItemStatus,
    ) -> LifecycleResult<StatusChange> {
        let item = snapshot.require(id)?;

        match lifecycle::rule(item.status, to) {
            TransitionRule::RequiresLink => {
                let candidates = snapshot.candidates_for(id);
                if candidates.is_empty() {
                    return Err(LifecycleError::NoCandidates(id));
                }
                Ok(StatusChange::CounterpartRequired {
                    item_id: id,
                    candidates,
                })
            }
            TransitionRule::Direct => {
                let _guard = self.in_flight.acquire(&[id])?;

                let current = self.reload(id).await?;
                let rule = lifecycle::rule(current.status, to);
                if rule != TransitionRule::Direct {
                    return Err(LifecycleError::InvalidTransition {
                        from: current.status,
                        to,
                        hint: rule.rejection_hint().unwrap_or("item changed since it was read"),
                    });
                }

                let updated = self.repository.update(id, ItemUpdate::status(to)).await?;
                tracing::info!(item_id = %id, from = %current.status, to = %to, "Status changed");
                Ok(StatusChange::Applied(
                    self.settle(snapshot, &[updated], &[]).await,
                ))
            }
            rule => Err(LifecycleError::InvalidTransition {
                from: item.status,
                to,
                hint: rule.rejection_hint().unwrap_or("transition not allowed"),
            }),
        }
    }

    pub fn transition_menu(&self, snapshot: &ItemSnapshot, id: Uuid) -> LifecycleResult<TransitionMenu> {
        let item = snapshot.require(id)?;
        Ok(TransitionMenu {
            item_id: id,
            status: item.status,
            allowed: lifecycle::menu(item.status).to_vec(),
        })
    }

    /// Found items that may be linked to the lost item `lost_id`.
    pub fn candidates(&self, snapshot: &ItemSnapshot, lost_id: Uuid) -> LifecycleResult<Vec<Item>> {
        let lost = snapshot.require(lost_id)?;
        if lost.status != ItemStatus::Lost {
            return Err(LifecycleError::NotEligible {
                id: lost_id,
                reason: "only lost items can be linked",
            });
        }
        Ok(snapshot.candidates_for(lost_id))
    }

    /// Pair a lost item with a found item, marking both returned.
    #[instrument(skip(self, ctx, snapshot), fields(admin = %ctx.email()))]
    pub async fn link(
        &self,
        ctx: &AdminContext,
        snapshot: &ItemSnapshot,
        lost_id: Uuid,
        found_id: Uuid,
    ) -> LifecycleResult<Outcome> {
        let lost = snapshot.require(lost_id)?;
        Self::ensure_lost_side(lost)?;
        if snapshot.candidates_for(lost_id).is_empty() {
            return Err(LifecycleError::NoCandidates(lost_id));
        }
        Self::ensure_linkable(lost, snapshot.require(found_id)?)?;

        let _guard = self.in_flight.acquire(&[lost_id, found_id])?;

        // The snapshot may predate another link to either side
        let lost = self.reload(lost_id).await?;
        let found = self.reload(found_id).await?;
        Self::ensure_linkable(&lost, &found)?;

        let written = self
            .write_pair(
                (lost_id, ItemUpdate::link_lost_side(found_id)),
                (found_id, ItemUpdate::link_found_side(lost_id)),
            )
            .await?;
        tracing::info!(lost_id = %lost_id, found_id = %found_id, "Items linked");

        Ok(self.settle(snapshot, &written, &[]).await)
    }

    /// Undo a link; either side's id may be passed.
    #[instrument(skip(self, ctx, snapshot), fields(admin = %ctx.email()))]
    pub async fn unlink(
        &self,
        ctx: &AdminContext,
        snapshot: &ItemSnapshot,
        item_id: Uuid,
    ) -> LifecycleResult<Outcome> {
        let item = snapshot.require(item_id)?;
        let Some(linked_id) = item.linked_item_id.filter(|_| item.is_linked) else {
            return Err(LifecycleError::NotLinked(item_id));
        };

        // Only the found side carries the lost id
        let (lost_id, found_id) = match item.original_lost_item_id {
            Some(original) => (original, item_id),
            None => (item_id, linked_id),
        };
        let counterpart_id = if lost_id == item_id { found_id } else { lost_id };

        let _guard = self.in_flight.acquire(&[lost_id, found_id])?;

        let current = self.reload(item_id).await?;
        if !current.is_linked || current.linked_item_id.is_none() {
            return Err(LifecycleError::NotLinked(item_id));
        }
        if current.linked_item_id != Some(linked_id)
            || current.original_lost_item_id != item.original_lost_item_id
        {
            return Err(LifecycleError::StaleSnapshot(item_id));
        }

        let Some(counterpart) = self.repository.get_by_id(counterpart_id).await? else {
            return Err(LifecycleError::LinkedItemNotFound(counterpart_id));
        };
        if counterpart.is_linked && counterpart.linked_item_id != Some(item_id) {
            return Err(LifecycleError::NotEligible {
                id: counterpart_id,
                reason: "counterpart is linked to another item",
            });
        }

        let written = self
            .write_pair(
                (lost_id, ItemUpdate::reset_to(ItemStatus::Lost)),
                (found_id, ItemUpdate::reset_to(ItemStatus::Found)),
            )
            .await?;
        tracing::info!(lost_id = %lost_id, found_id = %found_id, "Items unlinked");

        Ok(self.settle(snapshot, &written, &[]).await)
    }

    fn require_admin_view(snapshot: &ItemSnapshot) -> LifecycleResult<()> {
        if snapshot.view == View::Admin {
            Ok(())
        } else {
            Err(LifecycleError::Validation(
                "consistency checks need the admin view".to_string(),
            ))
        }
    }

    pub fn check_consistency(&self, snapshot: &ItemSnapshot) -> LifecycleResult<ConsistencyReport> {
        Self::require_admin_view(snapshot)?;
        Ok(consistency::check_consistency(snapshot))
    }

    /// Roll every inconsistent item back to its unlinked role state.
    #[instrument(skip(self, ctx, snapshot), fields(admin = %ctx.email()))]
    pub async fn repair_consistency(
        &self,
        ctx: &AdminContext,
        snapshot: &ItemSnapshot,
    ) -> LifecycleResult<RepairOutcome> {
        let report = self.check_consistency(snapshot)?;
        let plan = consistency::repair_plan(snapshot, &report);

        let ids: Vec<Uuid> = plan.iter().map(|(id, _)| *id).collect();
        let _guard = self.in_flight.acquire(&ids)?;

        let mut repaired = Vec::with_capacity(plan.len());
        let mut written = Vec::with_capacity(plan.len());
        for (id, update) in plan {
            match self.repository.update(id, update).await {
                Ok(item) => {
                    repaired.push(id);
                    written.push(item);
                }
                Err(LifecycleError::ItemNotFound(_)) => {
                    tracing::debug!(item_id = %id, "Item vanished before repair");
                }
                Err(e) if repaired.is_empty() => return Err(e),
                Err(e) => {
                    return Err(LifecycleError::PartialWrite {
                        completed: repaired,
                        failed: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !repaired.is_empty() {
            tracing::warn!(count = repaired.len(), "Repaired inconsistent links");
        }

        let outcome = if written.is_empty() {
            self.refresh(snapshot.view).await?
        } else {
            self.settle(snapshot, &written, &[]).await
        };
        Ok(RepairOutcome { repaired, outcome })
    }
}
