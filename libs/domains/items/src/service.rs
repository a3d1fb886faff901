//! Item Service - Business logic layer

use field_selector::project_list;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ItemError, ItemResult};
use crate::mirror::IndexMirror;
use crate::models::{AuthUser, CreateItem, Item, ItemDetails, UpdateItem, UploadedImages};
use crate::query::{ITEM_SEARCHABLE_FIELDS, ItemFilter, ItemQueryParams, QueryBuilder, UserRef};
use crate::repository::{CategoryRepository, ItemRepository, UserRepository};
use crate::rewrite::apply_rewrites;

/// Item service providing business logic operations
///
/// Every successful create, update and delete is handed to the
/// [`IndexMirror`] after the store write has completed.
pub struct ItemService<R, U, C>
where
    R: ItemRepository,
    U: UserRepository,
    C: CategoryRepository,
{
    items: Arc<R>,
    users: Arc<U>,
    categories: Arc<C>,
    mirror: Arc<dyn IndexMirror>,
}

impl<R, U, C> ItemService<R, U, C>
where
    R: ItemRepository,
    U: UserRepository,
    C: CategoryRepository,
{
    pub fn new(items: R, users: U, categories: C, mirror: Arc<dyn IndexMirror>) -> Self {
        Self::from_shared(Arc::new(items), Arc::new(users), Arc::new(categories), mirror)
    }

    /// Build from repositories that are shared with other components
    pub fn from_shared(
        items: Arc<R>,
        users: Arc<U>,
        categories: Arc<C>,
        mirror: Arc<dyn IndexMirror>,
    ) -> Self {
        Self {
            items,
            users,
            categories,
            mirror,
        }
    }

    /// Create an item owned by `input.user` with the uploaded images attached
    #[instrument(skip(self, input, images), fields(user_id = %input.user, image_count = images.item_images.len()))]
    pub async fn create_item(
        &self,
        mut input: CreateItem,
        images: UploadedImages,
    ) -> ItemResult<Item> {
        input.validate()?;

        if self.users.find_by_id(input.user).await?.is_none() {
            return Err(ItemError::not_found("User", input.user));
        }

        input.images = images.paths();
        let item = self.items.create(input).await?;
        self.mirror.upsert(&item).await?;

        info!(item_id = %item.id, "Item created");
        Ok(item)
    }

    /// Items owned by the authenticated user
    ///
    /// The owner filter always comes from the caller's identity, whatever
    /// `user` the parameters carry.
    #[instrument(skip(self, params), fields(email = %auth.email))]
    pub async fn get_all_my_posts(
        &self,
        mut params: ItemQueryParams,
        auth: &AuthUser,
    ) -> ItemResult<Vec<Value>> {
        let user = self
            .users
            .find_by_email(&auth.email)
            .await?
            .ok_or_else(|| ItemError::Missing(format!("User with email {} not found.", auth.email)))?;

        params.user = Some(UserRef::Id(user.id));
        let query = QueryBuilder::new(ItemFilter::owned_by(user.id), params)
            .filter()
            .search(ITEM_SEARCHABLE_FIELDS)
            .sort()
            .paginate()
            .fields()
            .build();

        let items = self.items.list(&query).await?;
        Ok(project_list(&items, query.projection.as_ref())?)
    }

    /// Browse all items
    ///
    /// The user, date-range and category rewrites run first, in that order.
    /// Results are not paginated.
    #[instrument(skip(self, params))]
    pub async fn get_all_items(&self, params: ItemQueryParams) -> ItemResult<Vec<Value>> {
        let params = apply_rewrites(self.users.as_ref(), self.categories.as_ref(), params).await?;

        let query = QueryBuilder::new(ItemFilter::default(), params)
            .filter()
            .search(ITEM_SEARCHABLE_FIELDS)
            .sort()
            .fields()
            .build();

        let items = self.items.list(&query).await?;
        Ok(project_list(&items, query.projection.as_ref())?)
    }

    /// Get an item with owner and category; `None` if it does not exist
    #[instrument(skip(self))]
    pub async fn get_item(&self, id: Uuid) -> ItemResult<Option<ItemDetails>> {
        self.items.find_details(id).await
    }

    /// Replace the provided fields and return the updated item
    #[instrument(skip(self, input))]
    pub async fn update_item(&self, id: Uuid, input: UpdateItem) -> ItemResult<Item> {
        input.validate()?;

        if let Some(user) = input.user {
            if self.users.find_by_id(user).await?.is_none() {
                return Err(ItemError::not_found("User", user));
            }
        }

        let item = self
            .items
            .update(id, input)
            .await?
            .ok_or_else(|| ItemError::Missing(format!("Item with ID {id} not found.")))?;
        self.mirror.upsert(&item).await?;

        info!(item_id = %id, "Item updated");
        Ok(item)
    }

    /// Delete an item and return it; `None` if it did not exist
    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: Uuid) -> ItemResult<Option<Item>> {
        let Some(item) = self.items.delete(id).await? else {
            return Ok(None);
        };
        self.mirror.remove(item.id).await?;

        info!(item_id = %id, "Item deleted");
        Ok(Some(item))
    }
}

impl<R, U, C> Clone for ItemService<R, U, C>
where
    R: ItemRepository,
    U: UserRepository,
    C: CategoryRepository,
{
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            users: Arc::clone(&self.users),
            categories: Arc::clone(&self.categories),
            mirror: Arc::clone(&self.mirror),
        }
    }
}
