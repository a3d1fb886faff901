use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// No client or index handle could be obtained
    #[error("Search index unavailable: {0}")]
    IndexUnavailable(String),

    /// Transport-level failure talking to the search engine
    #[error("Search request failed: {0}")]
    Request(String),

    /// The search engine answered with a non-success status
    #[error("Search engine returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    /// Error code reported by the engine, e.g. `index_not_found`
    pub fn code(&self) -> Option<&str> {
        match self {
            SearchError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_index_not_found(&self) -> bool {
        self.code() == Some("index_not_found")
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_and_code() {
        let err = SearchError::Api {
            status: 404,
            code: Some("index_not_found".to_string()),
            message: "Index `items` not found.".to_string(),
        };
        assert_eq!(err.to_string(), "Search engine returned 404: Index `items` not found.");
        assert!(err.is_index_not_found());
    }

    #[test]
    fn test_non_api_errors_have_no_code() {
        let err = SearchError::IndexUnavailable("client not configured".to_string());
        assert_eq!(err.code(), None);
        assert!(!err.is_index_not_found());
    }
}
