//! Items Domain
//!
//! Marketplace items: CRUD with owner and category references, browse queries
//! built from request parameters, and mirroring of every mutation into the
//! search index.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Service   │  ← Business logic, validation
//! └──┬───────┬──┘
//!    │       │
//!    │  ┌────▼─────────┐      ┌──────────────────┐
//!    │  │ IndexMirror  │ ───► │ Outbox + Relay   │ ─► search index
//!    │  └──────────────┘      └──────────────────┘
//!    │
//! ┌──▼──────────┐   ┌──────────────┐
//! │ Repository  │ ◄─│ QueryBuilder │  ← filter, search, sort, paginate, fields
//! └──────┬──────┘   └──────────────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Entities, DTOs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_items::{
//!     MongoCategoryRepository, MongoItemRepository, MongoOutboxRepository,
//!     MongoUserRepository, OutboxMirror, ItemService,
//! };
//! use mongodb::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let db = client.database("marketplace");
//!
//! let outbox = Arc::new(MongoOutboxRepository::new(db.clone()));
//! let service = ItemService::new(
//!     MongoItemRepository::new(db.clone()),
//!     MongoUserRepository::new(db.clone()),
//!     MongoCategoryRepository::new(db),
//!     Arc::new(OutboxMirror::new(outbox)),
//! );
//!
//! let item = service.get_item(uuid::Uuid::now_v7()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod mirror;
pub mod models;
pub mod mongodb;
pub mod outbox;
pub mod query;
pub mod repository;
pub mod rewrite;
pub mod service;

// Re-export commonly used types
pub use error::{ItemError, ItemResult};
pub use memory::{
    InMemoryCategoryRepository, InMemoryItemRepository, InMemoryOutboxRepository,
    InMemoryUserRepository,
};
pub use mirror::{DirectMirror, IndexMirror, OutboxMirror};
pub use models::{
    AuthUser, Category, CreateItem, ImageFile, Item, ItemDetails, ItemSearchDocument, ItemStatus,
    UpdateItem, UploadedImages, User,
};
pub use mongodb::{
    MongoCategoryRepository, MongoItemRepository, MongoOutboxRepository, MongoUserRepository,
};
pub use outbox::{
    DrainReport, IndexMirrorRelay, MirrorEvent, MirrorEventStatus, MirrorOp, RelayConfig,
};
pub use query::{
    CategoryRef, DateRange, ItemFilter, ItemQuery, ItemQueryParams, QueryBuilder, SortSpec,
    UserRef,
};
pub use repository::{CategoryRepository, ItemRepository, OutboxRepository, UserRepository};
pub use service::ItemService;
