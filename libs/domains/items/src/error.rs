use domain_search::SearchError;
use field_selector::FieldSelectionError;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ItemError {
    /// A referenced record does not exist
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Lookup miss reported as a plain failure rather than a 404
    #[error("{0}")]
    Missing(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ItemResult<T> = Result<T, ItemError>;

impl ItemError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ItemError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Whether the error reports a missing record, whichever kind it uses
    pub fn is_not_found(&self) -> bool {
        matches!(self, ItemError::NotFound { .. } | ItemError::Missing(_))
    }

    /// HTTP status an upstream layer should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            ItemError::NotFound { .. } => StatusCode::NOT_FOUND,
            ItemError::Validation(_) => StatusCode::BAD_REQUEST,
            ItemError::Missing(_)
            | ItemError::Database(_)
            | ItemError::Search(_)
            | ItemError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<mongodb::error::Error> for ItemError {
    fn from(err: mongodb::error::Error) -> Self {
        ItemError::Database(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for ItemError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        ItemError::Internal(format!("BSON encoding failed: {err}"))
    }
}

impl From<mongodb::bson::de::Error> for ItemError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        ItemError::Database(format!("Malformed document: {err}"))
    }
}

impl From<validator::ValidationErrors> for ItemError {
    fn from(err: validator::ValidationErrors) -> Self {
        ItemError::Validation(err.to_string())
    }
}

impl From<FieldSelectionError> for ItemError {
    fn from(err: FieldSelectionError) -> Self {
        match err {
            FieldSelectionError::Serialization(msg) => ItemError::Internal(msg),
            other => ItemError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_not_found_kinds_are_recognized() {
        let structured = ItemError::not_found("User", "u1");
        let plain = ItemError::Missing("Item with ID a1 not found.".to_string());

        assert!(structured.is_not_found());
        assert!(plain.is_not_found());
        assert_eq!(structured.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(plain.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(structured.to_string(), "User not found: u1");
        assert_eq!(plain.to_string(), "Item with ID a1 not found.");
    }

    #[test]
    fn test_unknown_projection_field_is_a_validation_error() {
        let err: ItemError = FieldSelectionError::UnknownFields(vec!["secret".into()]).into();
        assert!(matches!(err, ItemError::Validation(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_search_errors_convert() {
        let err: ItemError = SearchError::Request("connection refused".into()).into();
        assert!(matches!(err, ItemError::Search(_)));
        assert!(!err.is_not_found());
    }
}
