//! In-process search index for development and tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{SearchError, SearchResult};
use crate::index::SearchIndex;
use crate::models::{SearchQuery, SearchResponse};

const DEFAULT_PRIMARY_KEY: &str = "id";

/// A successfully applied index operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOperation {
    EnsureIndex { index: String },
    Add { index: String, ids: Vec<String> },
    Delete { index: String, id: String },
}

#[derive(Debug, Default)]
struct MemoryIndex {
    primary_key: String,
    /// Documents in insertion order; replacing keeps the original position
    documents: Vec<(String, Value)>,
}

#[derive(Debug, Default)]
struct State {
    indexes: HashMap<String, MemoryIndex>,
    operations: Vec<IndexOperation>,
}

/// Search index kept in memory
///
/// Indexes are created on first write, like Meilisearch does. Matching is a
/// case-insensitive substring test of every query word against the string
/// values of a document; hits keep insertion order.
#[derive(Debug, Default, Clone)]
pub struct InMemorySearchIndex {
    state: Arc<RwLock<State>>,
    failing: Arc<AtomicBool>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until switched back, simulating an outage
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful writes, in order
    pub async fn operations(&self) -> Vec<IndexOperation> {
        self.state.read().await.operations.clone()
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.indexes.get(index).and_then(|idx| {
            idx.documents
                .iter()
                .find(|(doc_id, _)| doc_id == id)
                .map(|(_, doc)| doc.clone())
        })
    }

    pub async fn document_count(&self, index: &str) -> usize {
        let state = self.state.read().await;
        state.indexes.get(index).map_or(0, |idx| idx.documents.len())
    }

    fn check_available(&self) -> SearchResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SearchError::Request("search engine unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn document_id(document: &Value, primary_key: &str) -> SearchResult<String> {
    match document.get(primary_key) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(SearchError::Api {
            status: 400,
            code: Some("missing_document_id".to_string()),
            message: format!("Document is missing its primary key `{primary_key}`"),
        }),
    }
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(&s.to_lowercase());
            out.push(' ');
        }
        Value::Array(values) => values.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}

fn matches(document: &Value, words: &[String]) -> bool {
    if words.is_empty() {
        return true;
    }
    let mut text = String::new();
    collect_text(document, &mut text);
    words.iter().all(|word| text.contains(word.as_str()))
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn health(&self) -> SearchResult<bool> {
        Ok(!self.failing.load(Ordering::SeqCst))
    }

    async fn ensure_index(&self, index: &str, primary_key: &str) -> SearchResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state
            .indexes
            .entry(index.to_string())
            .or_insert_with(|| MemoryIndex {
                primary_key: primary_key.to_string(),
                documents: Vec::new(),
            });
        state.operations.push(IndexOperation::EnsureIndex {
            index: index.to_string(),
        });
        Ok(())
    }

    async fn add_documents(&self, index: &str, documents: Vec<Value>) -> SearchResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let target = state
            .indexes
            .entry(index.to_string())
            .or_insert_with(|| MemoryIndex {
                primary_key: DEFAULT_PRIMARY_KEY.to_string(),
                documents: Vec::new(),
            });

        let keyed = documents
            .into_iter()
            .map(|doc| Ok((document_id(&doc, &target.primary_key)?, doc)))
            .collect::<SearchResult<Vec<_>>>()?;

        let ids = keyed.iter().map(|(id, _)| id.clone()).collect();
        for (id, doc) in keyed {
            match target.documents.iter_mut().find(|(existing, _)| *existing == id) {
                Some(slot) => slot.1 = doc,
                None => target.documents.push((id, doc)),
            }
        }

        state.operations.push(IndexOperation::Add {
            index: index.to_string(),
            ids,
        });
        Ok(())
    }

    async fn delete_document(&self, index: &str, document_id: &str) -> SearchResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(target) = state.indexes.get_mut(index) {
            target.documents.retain(|(id, _)| id != document_id);
        }
        state.operations.push(IndexOperation::Delete {
            index: index.to_string(),
            id: document_id.to_string(),
        });
        Ok(())
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> SearchResult<SearchResponse> {
        let state = self.state.read().await;
        let target = state.indexes.get(index).ok_or_else(|| SearchError::Api {
            status: 404,
            code: Some("index_not_found".to_string()),
            message: format!("Index `{index}` not found."),
        })?;

        let words: Vec<String> = query.q.split_whitespace().map(str::to_lowercase).collect();
        let matched: Vec<Value> = target
            .documents
            .iter()
            .filter(|(_, doc)| matches(doc, &words))
            .map(|(_, doc)| doc.clone())
            .collect();

        let total = matched.len() as u64;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(20);
        let hits = matched.into_iter().skip(offset).take(limit).collect();

        Ok(SearchResponse {
            hits,
            query: query.q.clone(),
            processing_time_ms: 0,
            limit: Some(limit),
            offset: Some(offset),
            estimated_total_hits: Some(total),
        })
    }
}
