use serde_json::Value;
use std::sync::Arc;
use tracing::{error, instrument};

use crate::error::{SearchError, SearchResult};
use crate::index::{ITEMS_INDEX, IndexHandle, SearchIndex};

/// Read-only search facade over the items index
#[derive(Clone)]
pub struct SearchService {
    client: Option<Arc<dyn SearchIndex>>,
}

impl SearchService {
    pub fn new(client: Arc<dyn SearchIndex>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A service without a search client; every search fails with
    /// [`SearchError::IndexUnavailable`]
    pub fn unconfigured() -> Self {
        Self { client: None }
    }

    pub fn items_index(&self) -> SearchResult<IndexHandle> {
        self.client
            .as_ref()
            .map(|client| IndexHandle::new(Arc::clone(client), ITEMS_INDEX))
            .ok_or_else(|| {
                SearchError::IndexUnavailable("search client is not configured".to_string())
            })
    }

    /// Search the items index and return the hits only
    ///
    /// A missing term searches for the empty string, which matches everything.
    #[instrument(skip(self))]
    pub async fn search_items(&self, term: Option<&str>) -> SearchResult<Vec<Value>> {
        let index = self.items_index().inspect_err(|e| {
            error!(error = %e, "Failed to get items index");
        })?;

        match index.search(term.unwrap_or_default()).await {
            Ok(response) => Ok(response.hits),
            Err(e) => {
                error!(error = %e, index = index.name(), "Failed to search items");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("configured", &self.client.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MockSearchIndex;
    use crate::models::SearchResponse;
    use serde_json::json;

    fn response_with(hits: Vec<Value>) -> SearchResponse {
        SearchResponse {
            estimated_total_hits: Some(hits.len() as u64),
            hits,
            ..SearchResponse::default()
        }
    }

    #[tokio::test]
    async fn test_search_items_returns_hits_only() {
        let mut mock = MockSearchIndex::new();
        mock.expect_search()
            .withf(|index, query| index == "items" && query.q == "bike")
            .times(1)
            .returning(|_, _| Ok(response_with(vec![json!({ "id": "a1" })])));

        let service = SearchService::new(Arc::new(mock));
        let hits = service.search_items(Some("bike")).await.unwrap();

        assert_eq!(hits, vec![json!({ "id": "a1" })]);
    }

    #[tokio::test]
    async fn test_missing_term_is_searched_as_empty_string() {
        let mut mock = MockSearchIndex::new();
        mock.expect_search()
            .withf(|_, query| query.q.is_empty())
            .times(2)
            .returning(|_, _| {
                Ok(response_with(vec![json!({ "id": "a1" }), json!({ "id": "a2" })]))
            });

        let service = SearchService::new(Arc::new(mock));
        let without_term = service.search_items(None).await.unwrap();
        let empty_term = service.search_items(Some("")).await.unwrap();

        assert_eq!(without_term, empty_term);
        assert_eq!(without_term.len(), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_service_fails() {
        let service = SearchService::unconfigured();
        let err = service.search_items(Some("bike")).await.unwrap_err();
        assert!(matches!(err, SearchError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_engine_errors_are_returned_unchanged() {
        let mut mock = MockSearchIndex::new();
        mock.expect_search().returning(|_, _| {
            Err(SearchError::Api {
                status: 404,
                code: Some("index_not_found".to_string()),
                message: "Index `items` not found.".to_string(),
            })
        });

        let service = SearchService::new(Arc::new(mock));
        let err = service.search_items(None).await.unwrap_err();

        assert!(err.is_index_not_found());
    }
}
