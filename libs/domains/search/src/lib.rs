//! Search Domain
//!
//! Mirrors marketplace items into a full-text search index and answers free-text
//! queries against it.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐
//! │ SearchService  │  ← term → hits for the "items" index
//! └───────┬────────┘
//!         │
//! ┌───────▼────────┐
//! │  SearchIndex   │  ← trait: ensure index, add/delete documents, search
//! └───────┬────────┘
//!         │
//! ┌───────▼──────────────────────────────┐
//! │ MeiliSearchClient │ InMemorySearchIndex │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_search::{MeiliConfig, MeiliSearchClient, SearchService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MeiliSearchClient::connect(&MeiliConfig::new("http://localhost:7700")).await?;
//! let service = SearchService::new(Arc::new(client));
//!
//! let hits = service.search_items(Some("bike")).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod meilisearch;
pub mod memory;
pub mod models;
pub mod service;

pub use error::{SearchError, SearchResult};
pub use index::{
    ITEMS_INDEX, IndexHandle, SearchIndex, add_document_to_index, delete_document_from_index,
};
pub use meilisearch::{MeiliConfig, MeiliSearchClient};
pub use memory::{InMemorySearchIndex, IndexOperation};
pub use models::{SearchQuery, SearchResponse};
pub use service::SearchService;
