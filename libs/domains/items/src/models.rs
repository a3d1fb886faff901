use chrono::{DateTime, SubsecRound, Utc};
use field_selector::SelectableFields;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Listing status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    /// Listed and open for offers
    #[default]
    Available,
    /// A buyer has reserved the item
    Pending,
    Sold,
}

/// Item entity - a marketplace listing stored in MongoDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (stored as _id in MongoDB)
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    /// Owner
    pub user: Uuid,
    pub category: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub status: ItemStatus,
    /// Category specific attributes (condition, size, brand, ...)
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Paths of the uploaded images
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Marketplace user (read-only from this domain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Item category (read-only from this domain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub name: String,
}

/// DTO for creating a new item
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateItem {
    pub user: Uuid,
    pub category: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    pub location: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Replaced by the uploaded image paths on creation
    #[serde(default)]
    pub images: Vec<String>,
}

/// DTO for updating an existing item; only provided fields are replaced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl UpdateItem {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One uploaded file record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFile {
    /// Storage path of the uploaded file
    pub path: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Files uploaded alongside a create request, grouped by form field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadedImages {
    #[serde(rename = "itemImages", default)]
    pub item_images: Vec<ImageFile>,
}

impl UploadedImages {
    /// Paths in upload order
    pub fn paths(&self) -> Vec<String> {
        self.item_images.iter().map(|f| f.path.clone()).collect()
    }
}

/// Identity of the authenticated caller, resolved upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub email: String,
}

impl AuthUser {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Item with its owner and category populated
///
/// A reference that no longer resolves populates as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub id: Uuid,
    pub user: Option<User>,
    pub category: Option<Category>,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub status: ItemStatus,
    pub attributes: serde_json::Value,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemDetails {
    pub fn populate(item: Item, user: Option<User>, category: Option<Category>) -> Self {
        Self {
            id: item.id,
            user,
            category,
            title: item.title,
            description: item.description,
            price: item.price,
            location: item.location,
            status: item.status,
            attributes: item.attributes,
            images: item.images,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

impl SelectableFields for ItemDetails {
    fn available_fields() -> &'static [&'static str] {
        &[
            "id",
            "user",
            "category",
            "title",
            "description",
            "price",
            "location",
            "status",
            "attributes",
            "images",
            "created_at",
            "updated_at",
        ]
    }
}

/// Denormalized copy of an item as stored in the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSearchDocument {
    /// Index primary key
    pub id: String,
    pub user: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub status: ItemStatus,
    pub attributes: serde_json::Value,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Item> for ItemSearchDocument {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.to_string(),
            user: item.user.to_string(),
            category: item.category.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            price: item.price,
            location: item.location.clone(),
            status: item.status,
            attributes: item.attributes.clone(),
            images: item.images.clone(),
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

impl ItemSearchDocument {
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Item {
    /// Create a new item from CreateItem DTO
    pub fn new(input: CreateItem) -> Self {
        // Stored dates keep millisecond precision
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id: Uuid::now_v7(),
            user: input.user,
            category: input.category,
            title: input.title,
            description: input.description,
            price: input.price,
            location: input.location,
            status: input.status,
            attributes: input.attributes,
            images: input.images,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply updates from UpdateItem DTO
    pub fn apply_update(&mut self, update: UpdateItem) {
        if let Some(user) = update.user {
            self.user = user;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(price) = update.price {
            self.price = Some(price);
        }
        if let Some(location) = update.location {
            self.location = Some(location);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(attributes) = update.attributes {
            self.attributes = attributes;
        }
        if let Some(images) = update.images {
            self.images = images;
        }
        self.updated_at = Utc::now().trunc_subsecs(3);
    }
}
