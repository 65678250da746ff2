//! MongoDB implementations of the repository traits

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Bson, Document, doc, to_bson},
    options::{FindOneAndUpdateOptions, FindOptions, ReplaceOptions, ReturnDocument},
};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{AdminPrincipal, Item, ItemUpdate, NewItem};
use crate::repository::{AdminRepository, ItemRepository};

fn id_filter(id: Uuid) -> Document {
    doc! { "_id": to_bson(&id).unwrap_or(Bson::Null) }
}

fn newest_first() -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build()
}

/// MongoDB implementation of [`ItemRepository`]
#[derive(Clone)]
pub struct MongoItemRepository {
    collection: Collection<Item>,
}

impl MongoItemRepository {
    /// Use the `items` collection of `db`.
    ///
    /// ```ignore
    /// let client = Client::with_uri_str("mongodb://localhost:27017").await?;
    /// let repo = MongoItemRepository::new(client.database("lost_found"));
    /// ```
    pub fn new(db: Database) -> Self {
        let collection = db.collection::<Item>("items");
        Self { collection }
    }

    /// Create the indexes backing both listing queries.
    #[instrument(skip(self))]
    pub async fn ensure_indexes(&self) -> LifecycleResult<()> {
        let indexes = vec![
            IndexModel::builder().keys(doc! { "created_at": -1 }).build(),
            IndexModel::builder()
                .keys(doc! { "is_approved": 1, "created_at": -1 })
                .build(),
        ];
        self.collection.create_indexes(indexes).await?;
        tracing::info!("Item indexes ready");
        Ok(())
    }

    /// Translate an [`ItemUpdate`] into `$set` / `$unset` operators.
    fn build_update(update: &ItemUpdate) -> LifecycleResult<Document> {
        let mut set = Document::new();
        let mut unset = Document::new();

        if let Some(status) = update.status {
            set.insert("status", status.to_string());
        }
        if let Some(approved) = update.is_approved {
            set.insert("is_approved", approved);
        }
        if let Some(is_linked) = update.is_linked {
            set.insert("is_linked", is_linked);
        }
        for (field, value) in [
            ("linked_item_id", update.linked_item_id),
            ("original_lost_item_id", update.original_lost_item_id),
        ] {
            match value {
                Some(Some(id)) => {
                    set.insert(field, to_bson(&id)?);
                }
                Some(None) => {
                    unset.insert(field, "");
                }
                None => {}
            }
        }

        let mut document = Document::new();
        if !set.is_empty() {
            document.insert("$set", set);
        }
        if !unset.is_empty() {
            document.insert("$unset", unset);
        }
        Ok(document)
    }
}

#[async_trait]
impl ItemRepository for MongoItemRepository {
    #[instrument(skip(self, input), fields(item_name = %input.name))]
    async fn create(&self, input: NewItem) -> LifecycleResult<Item> {
        let item = Item::new(input);

        self.collection.insert_one(&item).await?;

        tracing::info!(item_id = %item.id, status = %item.status, "Item reported");
        Ok(item)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> LifecycleResult<Option<Item>> {
        let item = self.collection.find_one(id_filter(id)).await?;
        Ok(item)
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: Uuid, update: ItemUpdate) -> LifecycleResult<Item> {
        let document = Self::build_update(&update)?;
        if document.is_empty() {
            return self
                .get_by_id(id)
                .await?
                .ok_or(LifecycleError::ItemNotFound(id));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let item = self
            .collection
            .find_one_and_update(id_filter(id), document)
            .with_options(options)
            .await?
            .ok_or(LifecycleError::ItemNotFound(id))?;

        tracing::info!(item_id = %id, status = %item.status, "Item updated");
        Ok(item)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> LifecycleResult<bool> {
        let result = self.collection.delete_one(id_filter(id)).await?;

        if result.deleted_count > 0 {
            tracing::info!(item_id = %id, "Item deleted");
        }
        Ok(result.deleted_count > 0)
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> LifecycleResult<Vec<Item>> {
        let cursor = self
            .collection
            .find(doc! {})
            .with_options(newest_first())
            .await?;
        let items: Vec<Item> = cursor.try_collect().await?;
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn list_approved(&self) -> LifecycleResult<Vec<Item>> {
        let cursor = self
            .collection
            .find(doc! { "is_approved": true })
            .with_options(newest_first())
            .await?;
        let items: Vec<Item> = cursor.try_collect().await?;
        Ok(items)
    }
}

/// MongoDB implementation of [`AdminRepository`], keyed by email
#[derive(Clone)]
pub struct MongoAdminRepository {
    collection: Collection<AdminPrincipal>,
}

impl MongoAdminRepository {
    pub fn new(db: Database) -> Self {
        let collection = db.collection::<AdminPrincipal>("admins");
        Self { collection }
    }
}

#[async_trait]
impl AdminRepository for MongoAdminRepository {
    #[instrument(skip(self))]
    async fn get(&self, email: &str) -> LifecycleResult<Option<AdminPrincipal>> {
        let admin = self.collection.find_one(doc! { "_id": email }).await?;
        Ok(admin)
    }

    #[instrument(skip(self, admin), fields(email = %admin.email))]
    async fn upsert(&self, admin: AdminPrincipal) -> LifecycleResult<AdminPrincipal> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "_id": admin.email.as_str() }, &admin)
            .with_options(options)
            .await?;

        tracing::info!(email = %admin.email, granted_by = %admin.granted_by, "Admin granted");
        Ok(admin)
    }

    #[instrument(skip(self))]
    async fn delete(&self, email: &str) -> LifecycleResult<bool> {
        let result = self.collection.delete_one(doc! { "_id": email }).await?;
        Ok(result.deleted_count > 0)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> LifecycleResult<Vec<AdminPrincipal>> {
        let options = FindOptions::builder()
            .sort(doc! { "granted_at": -1 })
            .build();
        let cursor = self.collection.find(doc! {}).with_options(options).await?;
        let admins: Vec<AdminPrincipal> = cursor.try_collect().await?;
        Ok(admins)
    }
}
