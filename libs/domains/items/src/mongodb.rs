//! MongoDB implementations of the item repositories
//!
//! Documents are encoded with `to_document` and ids with `to_bson`, so stored
//! ids and filter ids always share one representation. Timestamps are stored
//! as BSON dates so range filters and sorts compare instants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    Collection, Database,
    bson::{Bson, Document, doc, from_document, to_bson, to_document},
    options::{FindOptions, ReturnDocument},
};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{HashMap, HashSet};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ItemError, ItemResult};
use crate::models::{Category, CreateItem, Item, ItemDetails, UpdateItem, User};
use crate::outbox::{MirrorEvent, MirrorEventStatus};
use crate::query::{ItemFilter, ItemQuery, SearchClause, SortDirection};
use crate::repository::{CategoryRepository, ItemRepository, OutboxRepository, UserRepository};

pub const ITEMS_COLLECTION: &str = "items";
pub const USERS_COLLECTION: &str = "users";
pub const CATEGORIES_COLLECTION: &str = "categories";
pub const OUTBOX_COLLECTION: &str = "item_index_outbox";

const ITEM_DATE_FIELDS: &[&str] = &["created_at", "updated_at"];
const EVENT_DATE_FIELDS: &[&str] = &["available_at", "created_at", "processed_at"];

fn id_bson(id: &Uuid) -> ItemResult<Bson> {
    Ok(to_bson(id)?)
}

fn ids_bson<'a>(ids: impl IntoIterator<Item = &'a Uuid>) -> ItemResult<Vec<Bson>> {
    ids.into_iter().map(id_bson).collect()
}

/// Convert chrono DateTime to BSON DateTime
fn datetime_bson(dt: DateTime<Utc>) -> Bson {
    Bson::DateTime(mongodb::bson::DateTime::from_millis(dt.timestamp_millis()))
}

/// Encode a model, storing the named timestamp fields as BSON dates
fn encode<T: Serialize>(value: &T, date_fields: &[&str]) -> ItemResult<Document> {
    let mut doc = to_document(value)?;
    for field in date_fields {
        let parsed = match doc.get(*field) {
            Some(Bson::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| ItemError::Internal(format!("Invalid timestamp in '{field}': {e}")))?,
            _ => continue,
        };
        doc.insert(*field, datetime_bson(parsed.with_timezone(&Utc)));
    }
    Ok(doc)
}

/// Decode a stored document; BSON dates are read back as chrono timestamps
fn decode<T: DeserializeOwned>(mut doc: Document) -> ItemResult<T> {
    for (field, value) in doc.iter_mut() {
        if let Bson::DateTime(dt) = value {
            let millis = dt.timestamp_millis();
            let restored = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                ItemError::Internal(format!("Timestamp out of range in '{field}'"))
            })?;
            *value = Bson::String(restored.to_rfc3339());
        }
    }
    Ok(from_document(doc)?)
}

async fn collect_docs<T: DeserializeOwned>(cursor: mongodb::Cursor<Document>) -> ItemResult<Vec<T>> {
    let docs: Vec<Document> = cursor.try_collect().await?;
    docs.into_iter().map(decode).collect()
}

/// Case-insensitive regex matching the whole string
fn exact_ignore_case(value: &str) -> Document {
    doc! { "$regex": format!("^{}$", regex::escape(value)), "$options": "i" }
}

/// MongoDB implementation of the ItemRepository
///
/// Owners and categories are populated with one batched lookup each.
pub struct MongoItemRepository {
    items: Collection<Document>,
    users: Collection<Document>,
    categories: Collection<Document>,
}

impl MongoItemRepository {
    /// Create a new MongoItemRepository
    ///
    /// # Example
    /// ```ignore
    /// let client = Client::with_uri_str("mongodb://localhost:27017").await?;
    /// let repo = MongoItemRepository::new(client.database("marketplace"));
    /// ```
    pub fn new(db: Database) -> Self {
        Self {
            items: db.collection(ITEMS_COLLECTION),
            users: db.collection(USERS_COLLECTION),
            categories: db.collection(CATEGORIES_COLLECTION),
        }
    }

    /// Get the underlying items collection for advanced operations
    pub fn collection(&self) -> &Collection<Document> {
        &self.items
    }

    /// Build a MongoDB filter document from the query filter and search clause
    pub(crate) fn build_filter(
        filter: &ItemFilter,
        search: Option<&SearchClause>,
    ) -> ItemResult<Document> {
        let mut doc = doc! {};

        if filter.none_match {
            doc.insert("_id", doc! { "$in": Vec::<Bson>::new() });
            return Ok(doc);
        }

        if let Some(user) = &filter.user {
            doc.insert("user", id_bson(user)?);
        }

        if let Some(category) = &filter.category {
            doc.insert("category", id_bson(category)?);
        }

        if let Some(status) = filter.status {
            doc.insert("status", status.to_string());
        }

        if let Some(location) = &filter.location {
            doc.insert("location", exact_ignore_case(location));
        }

        if let Some(window) = &filter.created {
            let mut range = doc! {};
            if let Some(from) = window.from {
                range.insert("$gte", datetime_bson(from));
            }
            if let Some(until) = window.until {
                range.insert("$lt", datetime_bson(until));
            }
            if !range.is_empty() {
                doc.insert("created_at", range);
            }
        }

        if let Some(search) = search {
            let pattern = regex::escape(&search.term);
            let clauses: Vec<Document> = search
                .fields
                .iter()
                .map(|field| {
                    let mut clause = Document::new();
                    clause.insert(*field, doc! { "$regex": pattern.as_str(), "$options": "i" });
                    clause
                })
                .collect();
            doc.insert("$or", clauses);
        }

        Ok(doc)
    }

    pub(crate) fn build_sort(query: &ItemQuery) -> Document {
        let mut sort = doc! {};
        for spec in &query.sort {
            let field: &'static str = spec.field.into();
            let direction = match spec.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            sort.insert(field, direction);
        }
        sort.insert("_id", 1);
        sort
    }

    async fn populate(&self, items: Vec<Item>) -> ItemResult<Vec<ItemDetails>> {
        let user_ids: HashSet<Uuid> = items.iter().map(|i| i.user).collect();
        let category_ids: HashSet<Uuid> = items.iter().map(|i| i.category).collect();

        let users: HashMap<Uuid, User> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            let ids = ids_bson(&user_ids)?;
            let cursor = self.users.find(doc! { "_id": { "$in": ids } }).await?;
            collect_docs::<User>(cursor)
                .await?
                .into_iter()
                .map(|u| (u.id, u))
                .collect()
        };

        let categories: HashMap<Uuid, Category> = if category_ids.is_empty() {
            HashMap::new()
        } else {
            let ids = ids_bson(&category_ids)?;
            let cursor = self.categories.find(doc! { "_id": { "$in": ids } }).await?;
            collect_docs::<Category>(cursor)
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        Ok(items
            .into_iter()
            .map(|item| {
                let user = users.get(&item.user).cloned();
                let category = categories.get(&item.category).cloned();
                ItemDetails::populate(item, user, category)
            })
            .collect())
    }
}

#[async_trait]
impl ItemRepository for MongoItemRepository {
    #[instrument(skip(self, input), fields(title = %input.title))]
    async fn create(&self, input: CreateItem) -> ItemResult<Item> {
        let item = Item::new(input);

        self.items
            .insert_one(encode(&item, ITEM_DATE_FIELDS)?)
            .await?;

        tracing::info!(item_id = %item.id, "Item created successfully");
        Ok(item)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<Item>> {
        let doc = self.items.find_one(doc! { "_id": id_bson(&id)? }).await?;
        doc.map(decode).transpose()
    }

    #[instrument(skip(self))]
    async fn find_details(&self, id: Uuid) -> ItemResult<Option<ItemDetails>> {
        let Some(item) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        Ok(self.populate(vec![item]).await?.pop())
    }

    #[instrument(skip(self, query))]
    async fn list(&self, query: &ItemQuery) -> ItemResult<Vec<ItemDetails>> {
        let filter = Self::build_filter(&query.filter, query.search.as_ref())?;

        let mut options = FindOptions::builder()
            .sort(Self::build_sort(query))
            .build();
        if let Some(window) = query.window {
            options.skip = Some(window.skip);
            options.limit = Some(window.limit as i64);
        }

        let cursor = self.items.find(filter).with_options(options).await?;
        let items: Vec<Item> = collect_docs(cursor).await?;

        tracing::debug!(count = items.len(), "Items listed");
        self.populate(items).await
    }

    #[instrument(skip(self))]
    async fn find_all(&self) -> ItemResult<Vec<Item>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.items.find(doc! {}).with_options(options).await?;
        collect_docs(cursor).await
    }

    #[instrument(skip(self, input))]
    async fn update(&self, id: Uuid, input: UpdateItem) -> ItemResult<Option<Item>> {
        let mut set = to_document(&input)?;
        set.insert("updated_at", datetime_bson(Utc::now()));

        let updated = self
            .items
            .find_one_and_update(doc! { "_id": id_bson(&id)? }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?;

        if updated.is_some() {
            tracing::info!(item_id = %id, "Item updated successfully");
        }
        updated.map(decode).transpose()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> ItemResult<Option<Item>> {
        let removed = self
            .items
            .find_one_and_delete(doc! { "_id": id_bson(&id)? })
            .await?;

        if removed.is_some() {
            tracing::info!(item_id = %id, "Item deleted successfully");
        }
        removed.map(decode).transpose()
    }
}

/// MongoDB implementation of the UserRepository
pub struct MongoUserRepository {
    collection: Collection<Document>,
}

impl MongoUserRepository {
    pub fn new(db: Database) -> Self {
        Self {
            collection: db.collection(USERS_COLLECTION),
        }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<User>> {
        let doc = self.collection.find_one(doc! { "_id": id_bson(&id)? }).await?;
        doc.map(decode).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> ItemResult<Option<User>> {
        let doc = self.collection.find_one(doc! { "email": email }).await?;
        doc.map(decode).transpose()
    }
}

/// MongoDB implementation of the CategoryRepository
pub struct MongoCategoryRepository {
    collection: Collection<Document>,
}

impl MongoCategoryRepository {
    pub fn new(db: Database) -> Self {
        Self {
            collection: db.collection(CATEGORIES_COLLECTION),
        }
    }
}

#[async_trait]
impl CategoryRepository for MongoCategoryRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<Category>> {
        let doc = self.collection.find_one(doc! { "_id": id_bson(&id)? }).await?;
        doc.map(decode).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> ItemResult<Option<Category>> {
        let doc = self
            .collection
            .find_one(doc! { "name": exact_ignore_case(name) })
            .await?;
        doc.map(decode).transpose()
    }
}

/// MongoDB implementation of the OutboxRepository
pub struct MongoOutboxRepository {
    collection: Collection<Document>,
}

impl MongoOutboxRepository {
    pub fn new(db: Database) -> Self {
        Self {
            collection: db.collection(OUTBOX_COLLECTION),
        }
    }

    async fn set(&self, id: Uuid, fields: Document) -> ItemResult<()> {
        let result = self
            .collection
            .update_one(doc! { "_id": id_bson(&id)? }, doc! { "$set": fields })
            .await?;

        if result.matched_count == 0 {
            return Err(ItemError::not_found("Mirror event", id));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for MongoOutboxRepository {
    #[instrument(skip(self, event), fields(event_id = %event.id, item_id = %event.item_id))]
    async fn append(&self, event: MirrorEvent) -> ItemResult<()> {
        self.collection
            .insert_one(encode(&event, EVENT_DATE_FIELDS)?)
            .await?;
        Ok(())
    }

    async fn pending(&self, after: Option<Uuid>, limit: usize) -> ItemResult<Vec<MirrorEvent>> {
        let mut filter = doc! { "status": MirrorEventStatus::Pending.to_string() };
        if let Some(after) = after {
            filter.insert("_id", doc! { "$gt": id_bson(&after)? });
        }

        let options = FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .limit(limit as i64)
            .build();
        let cursor = self
            .collection
            .find(filter)
            .with_options(options)
            .await?;
        collect_docs(cursor).await
    }

    async fn mark_done(&self, id: Uuid, processed_at: DateTime<Utc>) -> ItemResult<()> {
        self.set(
            id,
            doc! {
                "status": MirrorEventStatus::Done.to_string(),
                "processed_at": datetime_bson(processed_at),
            },
        )
        .await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: u32,
        available_at: DateTime<Utc>,
        error: String,
    ) -> ItemResult<()> {
        self.set(
            id,
            doc! {
                "attempts": i64::from(attempts),
                "available_at": datetime_bson(available_at),
                "last_error": error,
            },
        )
        .await
    }

    async fn mark_failed(&self, id: Uuid, attempts: u32, error: String) -> ItemResult<()> {
        self.set(
            id,
            doc! {
                "status": MirrorEventStatus::Failed.to_string(),
                "attempts": i64::from(attempts),
                "last_error": error,
                "processed_at": datetime_bson(Utc::now()),
            },
        )
        .await
    }
}
