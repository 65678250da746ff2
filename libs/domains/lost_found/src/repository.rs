use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{AdminPrincipal, Item, ItemUpdate, NewItem};

/// Storage of lost and found reports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Persist a new item; the repository assigns id and submission time.
    async fn create(&self, input: NewItem) -> LifecycleResult<Item>;

    async fn get_by_id(&self, id: Uuid) -> LifecycleResult<Option<Item>>;

    /// Partial update; `ItemNotFound` when the id is not stored.
    async fn update(&self, id: Uuid, update: ItemUpdate) -> LifecycleResult<Item>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: Uuid) -> LifecycleResult<bool>;

    /// All items, newest first
    async fn list_all(&self) -> LifecycleResult<Vec<Item>>;

    /// Approved items, newest first
    async fn list_approved(&self) -> LifecycleResult<Vec<Item>>;
}

/// Storage of admin privilege records keyed by normalized email
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn get(&self, email: &str) -> LifecycleResult<Option<AdminPrincipal>>;

    async fn upsert(&self, admin: AdminPrincipal) -> LifecycleResult<AdminPrincipal>;

    async fn delete(&self, email: &str) -> LifecycleResult<bool>;

    async fn list(&self) -> LifecycleResult<Vec<AdminPrincipal>>;
}

pub(crate) fn newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// Process-local item store for tests and local runs
#[derive(Clone, Default)]
pub struct InMemoryItemRepository {
    items: Arc<RwLock<HashMap<Uuid, Item>>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `item` as is, bypassing `create`.
    pub async fn insert(&self, item: Item) {
        self.items.write().await.insert(item.id, item);
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn create(&self, input: NewItem) -> LifecycleResult<Item> {
        let item = Item::new(input);
        self.items.write().await.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_by_id(&self, id: Uuid) -> LifecycleResult<Option<Item>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: ItemUpdate) -> LifecycleResult<Item> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id).ok_or(LifecycleError::ItemNotFound(id))?;
        item.apply_update(&update);
        Ok(item.clone())
    }

    async fn delete(&self, id: Uuid) -> LifecycleResult<bool> {
        Ok(self.items.write().await.remove(&id).is_some())
    }

    async fn list_all(&self) -> LifecycleResult<Vec<Item>> {
        let mut items: Vec<Item> = self.items.read().await.values().cloned().collect();
        newest_first(&mut items);
        Ok(items)
    }

    async fn list_approved(&self) -> LifecycleResult<Vec<Item>> {
        let mut items: Vec<Item> = self
            .items
            .read()
            .await
            .values()
            .filter(|item| item.is_approved)
            .cloned()
            .collect();
        newest_first(&mut items);
        Ok(items)
    }
}

/// Process-local admin store for tests and local runs
#[derive(Clone, Default)]
pub struct InMemoryAdminRepository {
    admins: Arc<RwLock<HashMap<String, AdminPrincipal>>>,
}

impl InMemoryAdminRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdminRepository for InMemoryAdminRepository {
    async fn get(&self, email: &str) -> LifecycleResult<Option<AdminPrincipal>> {
        Ok(self.admins.read().await.get(email).cloned())
    }

    async fn upsert(&self, admin: AdminPrincipal) -> LifecycleResult<AdminPrincipal> {
        self.admins
            .write()
            .await
            .insert(admin.email.clone(), admin.clone());
        Ok(admin)
    }

    async fn delete(&self, email: &str) -> LifecycleResult<bool> {
        Ok(self.admins.write().await.remove(email).is_some())
    }

    async fn list(&self) -> LifecycleResult<Vec<AdminPrincipal>> {
        Ok(self.admins.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ItemStatus, Principal};
    use chrono::{Duration, NaiveDate, Utc};

    fn new_item(name: &str) -> NewItem {
        NewItem {
            name: name.into(),
            category: Category::Clothing,
            status: ItemStatus::Lost,
            location: "Cafeteria".into(),
            date: NaiveDate::from_ymd_opt(2025, 5, 5).unwrap(),
            description: String::new(),
            contact: "c@school.test".into(),
            image_url: None,
            reporter: Principal::new("u", "c@school.test", "C"),
        }
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let repo = InMemoryItemRepository::new();
        let mut older = Item::new(new_item("older"));
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = Item::new(new_item("newer"));
        repo.insert(older.clone()).await;
        repo.insert(newer.clone()).await;

        let items = repo.list_all().await.unwrap();
        assert_eq!(items[0].id, newer.id);
        assert_eq!(items[1].id, older.id);
    }

    #[tokio::test]
    async fn test_list_approved_filters() {
        let repo = InMemoryItemRepository::new();
        let pending = repo.create(new_item("pending")).await.unwrap();
        let approved = repo.create(new_item("approved")).await.unwrap();
        repo.update(approved.id, ItemUpdate::approve()).await.unwrap();

        let items = repo.list_approved().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, approved.id);
        assert!(items.iter().all(|item| item.id != pending.id));
    }

    #[tokio::test]
    async fn test_update_missing_item() {
        let repo = InMemoryItemRepository::new();
        let id = Uuid::now_v7();
        let result = repo.update(id, ItemUpdate::approve()).await;
        assert!(matches!(result, Err(LifecycleError::ItemNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let repo = InMemoryItemRepository::new();
        let item = repo.create(new_item("scarf")).await.unwrap();

        assert!(repo.delete(item.id).await.unwrap());
        assert!(!repo.delete(item.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_upsert_and_delete() {
        let repo = InMemoryAdminRepository::new();
        let admin = AdminPrincipal {
            email: "head@school.test".into(),
            granted_at: Utc::now(),
            granted_by: "system".into(),
        };
        repo.upsert(admin.clone()).await.unwrap();

        assert_eq!(repo.get("head@school.test").await.unwrap(), Some(admin));
        assert!(repo.delete("head@school.test").await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
