use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query; empty matches every document
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Response envelope of a search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Ranked matching documents
    #[serde(default)]
    pub hits: Vec<Value>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub estimated_total_hits: Option<u64>,
}

/// Acknowledgement of an asynchronous write, as returned by Meilisearch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EnqueuedTask {
    pub task_uid: u64,
    #[serde(default)]
    pub status: String,
}

/// Meilisearch error body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}
