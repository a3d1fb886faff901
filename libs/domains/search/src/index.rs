use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::error::SearchResult;
use crate::models::{SearchQuery, SearchResponse};

/// Name of the index that mirrors marketplace items
pub const ITEMS_INDEX: &str = "items";

/// Search engine operations used by the mirror writers and the search facade
///
/// Writes are upserts keyed by the index's primary key; deleting an absent
/// document is not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Whether the engine is reachable and ready
    async fn health(&self) -> SearchResult<bool>;

    /// Create the index if it does not exist yet
    async fn ensure_index(&self, index: &str, primary_key: &str) -> SearchResult<()>;

    /// Add or replace documents
    async fn add_documents(&self, index: &str, documents: Vec<Value>) -> SearchResult<()>;

    /// Remove one document by primary key
    async fn delete_document(&self, index: &str, document_id: &str) -> SearchResult<()>;

    /// Run a search and return the full response envelope
    async fn search(&self, index: &str, query: &SearchQuery) -> SearchResult<SearchResponse>;
}

/// A search client bound to one index
#[derive(Clone)]
pub struct IndexHandle {
    client: Arc<dyn SearchIndex>,
    name: String,
}

impl IndexHandle {
    pub fn new(client: Arc<dyn SearchIndex>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn search(&self, term: &str) -> SearchResult<SearchResponse> {
        self.client.search(&self.name, &SearchQuery::new(term)).await
    }

    pub async fn add_documents(&self, documents: Vec<Value>) -> SearchResult<()> {
        self.client.add_documents(&self.name, documents).await
    }

    pub async fn delete_document(&self, document_id: &str) -> SearchResult<()> {
        self.client.delete_document(&self.name, document_id).await
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle").field("name", &self.name).finish()
    }
}

/// Add (or replace) a single document in `index_name`
#[instrument(skip(client, document))]
pub async fn add_document_to_index(
    client: &dyn SearchIndex,
    document: Value,
    index_name: &str,
) -> SearchResult<()> {
    client.add_documents(index_name, vec![document]).await?;
    tracing::debug!("Document added to index");
    Ok(())
}

/// Remove a single document from `index_name`
#[instrument(skip(client))]
pub async fn delete_document_from_index(
    client: &dyn SearchIndex,
    index_name: &str,
    document_id: &str,
) -> SearchResult<()> {
    client.delete_document(index_name, document_id).await?;
    tracing::debug!("Document deleted from index");
    Ok(())
}
