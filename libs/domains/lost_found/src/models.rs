use axum_helpers::JwtClaims;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Item lifecycle status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Lost,
    Found,
    /// Reunited with its counterpart through a link
    Returned,
}

/// Item category, serialized with its display label
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
pub enum Category {
    Electronics,
    Clothing,
    Books,
    #[serde(rename = "Sports Equipment")]
    #[strum(serialize = "Sports Equipment")]
    SportsEquipment,
    #[serde(rename = "Personal Items")]
    #[strum(serialize = "Personal Items")]
    PersonalItems,
    #[default]
    Other,
}

/// Fixed-width RFC 3339 timestamps, so string order equals time order.
mod rfc3339_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Trimmed, lower-cased email used as the admin key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Authenticated caller as yielded by the identity boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub display_name: String,
}

impl Principal {
    pub fn new(uid: impl Into<String>, email: &str, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: normalize_email(email),
            display_name: display_name.into(),
        }
    }
}

impl From<&JwtClaims> for Principal {
    fn from(claims: &JwtClaims) -> Self {
        Self::new(claims.sub.clone(), &claims.email, claims.name.clone())
    }
}

/// Lost or found report stored in MongoDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Item {
    /// Unique identifier (stored as _id in MongoDB)
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub name: String,
    pub category: Category,
    pub status: ItemStatus,
    /// Where the item was lost or found
    pub location: String,
    /// Day the item was lost or found
    pub date: NaiveDate,
    pub description: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    /// Submission time
    #[serde(with = "rfc3339_millis")]
    #[schema(value_type = String, example = "2025-03-01T10:15:00.000Z")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_item_id: Option<Uuid>,
    #[serde(default)]
    pub is_linked: bool,
    /// Set only on the found side of a link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_lost_item_id: Option<Uuid>,
}

impl Item {
    /// Build an unapproved, unlinked item from a report.
    pub fn new(input: NewItem) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: input.name,
            category: input.category,
            status: input.status,
            location: input.location,
            date: input.date,
            description: input.description,
            contact: input.contact,
            image_url: input.image_url,
            user_id: input.reporter.uid,
            user_email: input.reporter.email,
            user_name: input.reporter.display_name,
            created_at: Utc::now().trunc_subsecs(3),
            is_approved: false,
            linked_item_id: None,
            is_linked: false,
            original_lost_item_id: None,
        }
    }

    /// Whether this item may be linked to the lost item `lost_id`.
    pub fn is_link_candidate_for(&self, lost_id: Uuid) -> bool {
        self.status == ItemStatus::Found && self.is_approved && !self.is_linked && self.id != lost_id
    }

    /// Status this item falls back to once it no longer has a link.
    ///
    /// The found side is recognised by `original_lost_item_id`; anything else
    /// that is linked or returned is treated as the lost side.
    pub fn unlinked_status(&self) -> ItemStatus {
        if self.original_lost_item_id.is_some() {
            ItemStatus::Found
        } else if self.is_linked || self.linked_item_id.is_some() || self.status == ItemStatus::Returned {
            ItemStatus::Lost
        } else {
            self.status
        }
    }

    pub fn apply_update(&mut self, update: &ItemUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(approved) = update.is_approved {
            self.is_approved = approved;
        }
        if let Some(linked) = update.linked_item_id {
            self.linked_item_id = linked;
        }
        if let Some(is_linked) = update.is_linked {
            self.is_linked = is_linked;
        }
        if let Some(original) = update.original_lost_item_id {
            self.original_lost_item_id = original;
        }
    }
}

/// Report submitted by a signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateItem {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category: Category,
    /// `lost` or `found`
    pub status: ItemStatus,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    pub date: NaiveDate,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    /// Defaults to the reporter's email when empty
    #[serde(default)]
    #[validate(length(max = 200))]
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub image_url: Option<String>,
}

/// Repository input for a new item
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub category: Category,
    pub status: ItemStatus,
    pub location: String,
    pub date: NaiveDate,
    pub description: String,
    pub contact: String,
    pub image_url: Option<String>,
    pub reporter: Principal,
}

/// Field-level update of lifecycle fields.
///
/// Outer `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub status: Option<ItemStatus>,
    pub is_approved: Option<bool>,
    pub linked_item_id: Option<Option<Uuid>>,
    pub is_linked: Option<bool>,
    pub original_lost_item_id: Option<Option<Uuid>>,
}

impl ItemUpdate {
    pub fn approve() -> Self {
        Self {
            is_approved: Some(true),
            ..Default::default()
        }
    }

    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Lost side of a link
    pub fn link_lost_side(found_id: Uuid) -> Self {
        Self {
            status: Some(ItemStatus::Returned),
            linked_item_id: Some(Some(found_id)),
            is_linked: Some(true),
            ..Default::default()
        }
    }

    /// Found side of a link, which remembers the lost id
    pub fn link_found_side(lost_id: Uuid) -> Self {
        Self {
            status: Some(ItemStatus::Returned),
            linked_item_id: Some(Some(lost_id)),
            is_linked: Some(true),
            original_lost_item_id: Some(Some(lost_id)),
            ..Default::default()
        }
    }

    /// Clear every link field and set `status`.
    pub fn reset_to(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            linked_item_id: Some(None),
            is_linked: Some(false),
            original_lost_item_id: Some(None),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Presentation filter over a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    pub approved: Option<bool>,
    /// Case-insensitive match on name, description or category
    pub search: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        if self.status.is_some_and(|status| item.status != status) {
            return false;
        }
        if self.approved.is_some_and(|approved| item.is_approved != approved) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                item.name.to_lowercase().contains(&term)
                    || item.description.to_lowercase().contains(&term)
                    || item.category.to_string().to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

/// Email-keyed admin privilege record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdminPrincipal {
    #[serde(rename = "_id", alias = "email")]
    pub email: String,
    #[serde(with = "rfc3339_millis")]
    #[schema(value_type = String)]
    pub granted_at: DateTime<Utc>,
    pub granted_by: String,
}

/// Request body for granting admin privileges
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct GrantAdmin {
    #[validate(email)]
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> Principal {
        Principal::new("uid-1", " Student@School.test ", "Student One")
    }

    fn new_item(status: ItemStatus) -> Item {
        Item::new(NewItem {
            name: "Blue water bottle".to_string(),
            category: Category::PersonalItems,
            status,
            location: "Gym".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            description: "Dented lid".to_string(),
            contact: "student@school.test".to_string(),
            image_url: None,
            reporter: reporter(),
        })
    }

    #[test]
    fn test_new_item_is_unapproved_and_unlinked() {
        let item = new_item(ItemStatus::Lost);
        assert!(!item.is_approved);
        assert!(!item.is_linked);
        assert_eq!(item.linked_item_id, None);
        assert_eq!(item.original_lost_item_id, None);
        assert_eq!(item.user_email, "student@school.test");
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(
            serde_json::to_value(Category::SportsEquipment).unwrap(),
            "Sports Equipment"
        );
        assert_eq!(
            "Personal Items".parse::<Category>().unwrap(),
            Category::PersonalItems
        );
        assert_eq!(serde_json::to_value(ItemStatus::Returned).unwrap(), "returned");
    }

    #[test]
    fn test_created_at_is_fixed_width_millis() {
        let item = new_item(ItemStatus::Found);
        let json = serde_json::to_value(&item).unwrap();
        let raw = json["created_at"].as_str().unwrap();
        assert_eq!(raw.len(), "2025-03-01T10:15:00.000Z".len());
        assert!(raw.ends_with('Z'));

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_missing_link_fields_default() {
        let mut json = serde_json::to_value(new_item(ItemStatus::Lost)).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("is_linked");
        obj.remove("is_approved");

        let item: Item = serde_json::from_value(json).unwrap();
        assert!(!item.is_linked);
        assert!(!item.is_approved);
    }

    #[test]
    fn test_link_and_reset_updates() {
        let mut lost = new_item(ItemStatus::Lost);
        let mut found = new_item(ItemStatus::Found);

        lost.apply_update(&ItemUpdate::link_lost_side(found.id));
        found.apply_update(&ItemUpdate::link_found_side(lost.id));

        assert_eq!(lost.status, ItemStatus::Returned);
        assert_eq!(lost.linked_item_id, Some(found.id));
        assert_eq!(lost.original_lost_item_id, None);
        assert_eq!(found.original_lost_item_id, Some(lost.id));
        assert_eq!(lost.unlinked_status(), ItemStatus::Lost);
        assert_eq!(found.unlinked_status(), ItemStatus::Found);

        found.apply_update(&ItemUpdate::reset_to(ItemStatus::Found));
        assert!(!found.is_linked);
        assert_eq!(found.linked_item_id, None);
        assert_eq!(found.original_lost_item_id, None);
    }

    #[test]
    fn test_link_candidate_rules() {
        let lost = new_item(ItemStatus::Lost);
        let mut found = new_item(ItemStatus::Found);
        assert!(!found.is_link_candidate_for(lost.id), "unapproved");

        found.is_approved = true;
        assert!(found.is_link_candidate_for(lost.id));
        assert!(!found.is_link_candidate_for(found.id), "self");

        found.is_linked = true;
        assert!(!found.is_link_candidate_for(lost.id), "already linked");
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let item = new_item(ItemStatus::Lost);
        let by_name = ItemFilter {
            search: Some("WATER".into()),
            ..Default::default()
        };
        let by_category = ItemFilter {
            search: Some("personal".into()),
            ..Default::default()
        };
        let miss = ItemFilter {
            search: Some("laptop".into()),
            ..Default::default()
        };

        assert!(by_name.matches(&item));
        assert!(by_category.matches(&item));
        assert!(!miss.matches(&item));
    }

    #[test]
    fn test_filter_status_and_approval() {
        let item = new_item(ItemStatus::Found);
        let pending = ItemFilter {
            approved: Some(false),
            status: Some(ItemStatus::Found),
            ..Default::default()
        };
        let approved = ItemFilter {
            approved: Some(true),
            ..Default::default()
        };

        assert!(pending.matches(&item));
        assert!(!approved.matches(&item));
    }

    #[test]
    fn test_update_is_empty() {
        assert!(ItemUpdate::default().is_empty());
        assert!(!ItemUpdate::approve().is_empty());
    }
}
