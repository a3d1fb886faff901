//! Meilisearch REST client

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_optional, env_parse, env_required};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{SearchError, SearchResult};
use crate::index::SearchIndex;
use crate::models::{ApiErrorBody, EnqueuedTask, SearchQuery, SearchResponse};

/// Meilisearch connection settings
#[derive(Clone)]
pub struct MeiliConfig {
    /// Base URL, e.g. `http://localhost:7700`
    pub host: String,
    /// Master or API key; sent as a bearer token when present
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl MeiliConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: None,
            timeout_secs: 10,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Load from the environment when `MEILISEARCH_HOST` is set, `None` otherwise
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        match env_optional("MEILISEARCH_HOST") {
            Some(_) => Self::from_env().map(Some),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for MeiliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeiliConfig")
            .field("host", &self.host)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Environment variables:
/// - `MEILISEARCH_HOST` (required)
/// - `MEILISEARCH_API_KEY` (optional)
/// - `MEILISEARCH_TIMEOUT_SECS` (default: 10)
impl FromEnv for MeiliConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("MEILISEARCH_HOST")?,
            api_key: env_optional("MEILISEARCH_API_KEY"),
            timeout_secs: env_parse("MEILISEARCH_TIMEOUT_SECS", 10)?,
        })
    }
}

/// Search index client backed by the Meilisearch HTTP API
#[derive(Clone)]
pub struct MeiliSearchClient {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for MeiliSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeiliSearchClient")
            .field("host", &self.host)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl MeiliSearchClient {
    /// Build a client without contacting the server
    pub fn new(config: &MeiliConfig) -> SearchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Build a client and verify the server reports itself available
    pub async fn connect(config: &MeiliConfig) -> SearchResult<Self> {
        let client = Self::new(config)?;

        if !client.health().await? {
            return Err(SearchError::IndexUnavailable(format!(
                "Meilisearch at {} is not available",
                client.host
            )));
        }

        info!(host = %client.host, "Connected to Meilisearch");
        Ok(client)
    }

    /// Release the client. Pending requests on clones are unaffected.
    pub fn shutdown(self) {
        info!(host = %self.host, "Meilisearch client released");
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{}", self.host, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn index_path(index: &str) -> String {
        format!("/indexes/{}", urlencoding::encode(index))
    }

    /// Map non-success responses into [`SearchError::Api`]
    async fn check(response: Response) -> SearchResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (message, code) = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) => (parsed.message, parsed.code),
            Err(_) => (body, None),
        };

        warn!(status = %status, code = ?code, message = %message, "Meilisearch request failed");
        Err(SearchError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn enqueued(response: Response) -> SearchResult<EnqueuedTask> {
        let task: EnqueuedTask = Self::check(response).await?.json().await?;
        debug!(task_uid = task.task_uid, status = %task.status, "Meilisearch task enqueued");
        Ok(task)
    }
}

#[async_trait]
impl SearchIndex for MeiliSearchClient {
    async fn health(&self) -> SearchResult<bool> {
        let response = self.request(Method::GET, "/health").send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(body.get("status").and_then(Value::as_str) == Some("available"))
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, index: &str, primary_key: &str) -> SearchResult<()> {
        let response = self
            .request(Method::GET, &Self::index_path(index))
            .send()
            .await?;

        if response.status() != StatusCode::NOT_FOUND {
            Self::check(response).await?;
            debug!("Index already exists");
            return Ok(());
        }

        let response = self
            .request(Method::POST, "/indexes")
            .json(&json!({ "uid": index, "primaryKey": primary_key }))
            .send()
            .await?;
        Self::enqueued(response).await?;

        info!("Index creation enqueued");
        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn add_documents(&self, index: &str, documents: Vec<Value>) -> SearchResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let path = format!("{}/documents?primaryKey=id", Self::index_path(index));
        let response = self
            .request(Method::POST, &path)
            .json(&documents)
            .send()
            .await?;
        Self::enqueued(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, index: &str, document_id: &str) -> SearchResult<()> {
        let path = format!(
            "{}/documents/{}",
            Self::index_path(index),
            urlencoding::encode(document_id)
        );
        let response = self.request(Method::DELETE, &path).send().await?;
        Self::enqueued(response).await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(q = %query.q))]
    async fn search(&self, index: &str, query: &SearchQuery) -> SearchResult<SearchResponse> {
        let path = format!("{}/search", Self::index_path(index));
        let response = self.request(Method::POST, &path).json(query).send().await?;
        let response: SearchResponse = Self::check(response).await?.json().await?;

        debug!(
            hits = response.hits.len(),
            processing_time_ms = response.processing_time_ms,
            "Search completed"
        );
        Ok(response)
    }
}
