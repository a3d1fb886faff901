//! In-memory repositories (for development/testing)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ItemError, ItemResult};
use crate::models::{Category, CreateItem, Item, ItemDetails, UpdateItem, User};
use crate::outbox::{MirrorEvent, MirrorEventStatus};
use crate::query::ItemQuery;
use crate::repository::{CategoryRepository, ItemRepository, OutboxRepository, UserRepository};

#[derive(Debug, Default, Clone)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> ItemResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCategoryRepository {
    categories: Arc<RwLock<HashMap<Uuid, Category>>>,
}

impl InMemoryCategoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, category: Category) {
        self.categories.write().await.insert(category.id, category);
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<Category>> {
        Ok(self.categories.read().await.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> ItemResult<Option<Category>> {
        let name = name.to_lowercase();
        let categories = self.categories.read().await;
        Ok(categories
            .values()
            .find(|c| c.name.to_lowercase() == name)
            .cloned())
    }
}

/// Item store that populates from the given user and category stores
#[derive(Debug, Default, Clone)]
pub struct InMemoryItemRepository {
    items: Arc<RwLock<HashMap<Uuid, Item>>>,
    users: InMemoryUserRepository,
    categories: InMemoryCategoryRepository,
}

impl InMemoryItemRepository {
    pub fn new(users: InMemoryUserRepository, categories: InMemoryCategoryRepository) -> Self {
        Self {
            items: Arc::default(),
            users,
            categories,
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    async fn populate(&self, item: Item) -> ItemResult<ItemDetails> {
        let user = self.users.find_by_id(item.user).await?;
        let category = self.categories.find_by_id(item.category).await?;
        Ok(ItemDetails::populate(item, user, category))
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn create(&self, input: CreateItem) -> ItemResult<Item> {
        let item = Item::new(input);
        self.items.write().await.insert(item.id, item.clone());

        tracing::info!(item_id = %item.id, "Created item");
        Ok(item)
    }

    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<Item>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn find_details(&self, id: Uuid) -> ItemResult<Option<ItemDetails>> {
        let item = self.items.read().await.get(&id).cloned();
        match item {
            Some(item) => Ok(Some(self.populate(item).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: &ItemQuery) -> ItemResult<Vec<ItemDetails>> {
        let mut matched: Vec<Item> = {
            let items = self.items.read().await;
            items.values().filter(|i| query.matches(i)).cloned().collect()
        };
        matched.sort_by(|a, b| query.compare(a, b));

        let (skip, limit) = match query.window {
            Some(window) => (window.skip as usize, window.limit as usize),
            None => (0, usize::MAX),
        };

        let mut result = Vec::new();
        for item in matched.into_iter().skip(skip).take(limit) {
            result.push(self.populate(item).await?);
        }
        Ok(result)
    }

    async fn find_all(&self) -> ItemResult<Vec<Item>> {
        let mut items: Vec<Item> = self.items.read().await.values().cloned().collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    async fn update(&self, id: Uuid, input: UpdateItem) -> ItemResult<Option<Item>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        item.apply_update(input);

        tracing::info!(item_id = %id, "Updated item");
        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: Uuid) -> ItemResult<Option<Item>> {
        let removed = self.items.write().await.remove(&id);
        if removed.is_some() {
            tracing::info!(item_id = %id, "Deleted item");
        }
        Ok(removed)
    }
}

/// Outbox kept in memory, in append order
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutboxRepository {
    events: Arc<RwLock<Vec<MirrorEvent>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make appends fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every event ever appended, in order
    pub async fn events(&self) -> Vec<MirrorEvent> {
        self.events.read().await.clone()
    }

    async fn modify(&self, id: Uuid, change: impl FnOnce(&mut MirrorEvent)) -> ItemResult<()> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ItemError::not_found("Mirror event", id))?;
        change(event);
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn append(&self, event: MirrorEvent) -> ItemResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ItemError::Database("outbox unavailable".to_string()));
        }
        self.events.write().await.push(event);
        Ok(())
    }

    async fn pending(&self, after: Option<Uuid>, limit: usize) -> ItemResult<Vec<MirrorEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.status == MirrorEventStatus::Pending)
            .filter(|e| after.is_none_or(|after| e.id > after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_done(&self, id: Uuid, processed_at: DateTime<Utc>) -> ItemResult<()> {
        self.modify(id, |event| {
            event.status = MirrorEventStatus::Done;
            event.processed_at = Some(processed_at);
        })
        .await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: u32,
        available_at: DateTime<Utc>,
        error: String,
    ) -> ItemResult<()> {
        self.modify(id, |event| {
            event.attempts = attempts;
            event.available_at = available_at;
            event.last_error = Some(error);
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, attempts: u32, error: String) -> ItemResult<()> {
        self.modify(id, |event| {
            event.status = MirrorEventStatus::Failed;
            event.attempts = attempts;
            event.last_error = Some(error);
            event.processed_at = Some(Utc::now());
        })
        .await
    }
}
