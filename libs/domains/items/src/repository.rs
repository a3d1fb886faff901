use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ItemResult;
use crate::models::{Category, CreateItem, Item, ItemDetails, UpdateItem, User};
use crate::outbox::MirrorEvent;
use crate::query::ItemQuery;

/// Repository trait for Item persistence
///
/// Implementations can use different storage backends (MongoDB, in-memory).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Persist a new item
    async fn create(&self, input: CreateItem) -> ItemResult<Item>;

    /// Get an item by ID
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<Item>>;

    /// Get an item by ID with owner and category populated
    async fn find_details(&self, id: Uuid) -> ItemResult<Option<ItemDetails>>;

    /// Run a listing query; results are populated
    async fn list(&self, query: &ItemQuery) -> ItemResult<Vec<ItemDetails>>;

    /// Every stored item, oldest first
    async fn find_all(&self) -> ItemResult<Vec<Item>>;

    /// Replace the provided fields and return the updated item, `None` if no
    /// item has this id
    async fn update(&self, id: Uuid, input: UpdateItem) -> ItemResult<Option<Item>>;

    /// Remove an item and return it, `None` if no item has this id
    async fn delete(&self, id: Uuid) -> ItemResult<Option<Item>>;
}

/// Read access to users
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> ItemResult<Option<User>>;
}

/// Read access to categories
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> ItemResult<Option<Category>>;

    /// Case-insensitive exact name match
    async fn find_by_name(&self, name: &str) -> ItemResult<Option<Category>>;
}

/// Durable log of pending index mirror writes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn append(&self, event: MirrorEvent) -> ItemResult<()>;

    /// Pending events with ids after `after`, in id order, due or not
    async fn pending(&self, after: Option<Uuid>, limit: usize) -> ItemResult<Vec<MirrorEvent>>;

    async fn mark_done(&self, id: Uuid, processed_at: DateTime<Utc>) -> ItemResult<()>;

    /// Record a failed attempt and postpone the event
    async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: u32,
        available_at: DateTime<Utc>,
        error: String,
    ) -> ItemResult<()>;

    /// Give up on the event after its final attempt
    async fn mark_failed(&self, id: Uuid, attempts: u32, error: String) -> ItemResult<()>;
}
