//! Field projection for list and detail responses.
//!
//! Parses the comma-separated `fields` query parameter (`title,price` to include,
//! `-attributes,-images` to exclude) and applies it to serialized values. The key
//! field of a type (usually `id`) is never projected away.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

// Re-export for convenience
pub use serde_json;

/// Types whose serialized fields can be projected
pub trait SelectableFields: Serialize {
    /// Top-level field names of the serialized form
    fn available_fields() -> &'static [&'static str];

    /// Field that always survives projection
    fn key_field() -> &'static str {
        "id"
    }
}

/// Errors that can occur during field selection
#[derive(Debug, thiserror::Error)]
pub enum FieldSelectionError {
    #[error("Unknown fields requested: {0:?}")]
    UnknownFields(Vec<String>),

    #[error("Cannot mix included and excluded fields in one projection")]
    MixedProjection,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A parsed `fields` projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only these fields (plus the key field)
    Include(BTreeSet<String>),
    /// Drop these fields
    Exclude(BTreeSet<String>),
}

impl Projection {
    /// Parse a raw `fields` value. Blank input yields `None` (no projection).
    pub fn parse(raw: &str) -> Result<Option<Self>, FieldSelectionError> {
        let mut included = BTreeSet::new();
        let mut excluded = BTreeSet::new();

        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.strip_prefix('-') {
                Some(field) if !field.is_empty() => {
                    excluded.insert(field.to_string());
                }
                Some(_) => {}
                None => {
                    included.insert(token.to_string());
                }
            }
        }

        match (included.is_empty(), excluded.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(Projection::Include(included))),
            (true, false) => Ok(Some(Projection::Exclude(excluded))),
            (false, false) => Err(FieldSelectionError::MixedProjection),
        }
    }

    /// Field names mentioned by this projection
    pub fn fields(&self) -> &BTreeSet<String> {
        match self {
            Projection::Include(fields) | Projection::Exclude(fields) => fields,
        }
    }

    /// Reject fields that `T` does not serialize
    pub fn validate<T: SelectableFields>(&self) -> Result<(), FieldSelectionError> {
        let available = T::available_fields();
        let unknown: Vec<String> = self
            .fields()
            .iter()
            .filter(|f| !available.contains(&f.as_str()))
            .cloned()
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(FieldSelectionError::UnknownFields(unknown))
        }
    }

    /// Apply to one serialized value; non-objects pass through untouched
    pub fn apply_value(&self, value: Value, key_field: &str) -> Value {
        match value {
            Value::Object(obj) => Value::Object(self.filter_object(obj, key_field)),
            other => other,
        }
    }

    fn filter_object(&self, obj: Map<String, Value>, key_field: &str) -> Map<String, Value> {
        obj.into_iter()
            .filter(|(k, _)| {
                k == key_field
                    || match self {
                        Projection::Include(fields) => fields.contains(k),
                        Projection::Exclude(fields) => !fields.contains(k),
                    }
            })
            .collect()
    }
}

/// Serialize a list and apply an optional projection to each element
pub fn project_list<T>(
    values: &[T],
    projection: Option<&Projection>,
) -> Result<Vec<Value>, FieldSelectionError>
where
    T: SelectableFields,
{
    if let Some(projection) = projection {
        tracing::debug!(fields = ?projection.fields(), count = values.len(), "Applying field projection");
    }

    values
        .iter()
        .map(|v| {
            let json = serde_json::to_value(v)
                .map_err(|e| FieldSelectionError::Serialization(e.to_string()))?;
            Ok(match projection {
                Some(projection) => projection.apply_value(json, T::key_field()),
                None => json,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Listing {
        id: u32,
        title: String,
        price: f64,
        location: String,
    }

    impl SelectableFields for Listing {
        fn available_fields() -> &'static [&'static str] {
            &["id", "title", "price", "location"]
        }
    }

    fn listing() -> Listing {
        Listing {
            id: 7,
            title: "Road bike".to_string(),
            price: 250.0,
            location: "Lisbon".to_string(),
        }
    }

    #[test]
    fn test_parse_blank_is_none() {
        assert_eq!(Projection::parse("").unwrap(), None);
        assert_eq!(Projection::parse(" , ,").unwrap(), None);
    }

    #[test]
    fn test_parse_include_and_exclude() {
        let include = Projection::parse("title, price").unwrap().unwrap();
        assert!(matches!(include, Projection::Include(ref f) if f.len() == 2));

        let exclude = Projection::parse("-location").unwrap().unwrap();
        assert!(matches!(exclude, Projection::Exclude(ref f) if f.contains("location")));
    }

    #[test]
    fn test_parse_mixed_is_rejected() {
        let err = Projection::parse("title,-price").unwrap_err();
        assert!(matches!(err, FieldSelectionError::MixedProjection));
    }

    #[test]
    fn test_validate_unknown_fields() {
        let projection = Projection::parse("title,seller_phone").unwrap().unwrap();
        let err = projection.validate::<Listing>().unwrap_err();
        assert!(matches!(err, FieldSelectionError::UnknownFields(ref f) if f == &vec!["seller_phone".to_string()]));
    }

    #[test]
    fn test_include_keeps_key_field() {
        let projection = Projection::parse("title").unwrap();
        let projected = project_list(&[listing()], projection.as_ref()).unwrap();
        let obj = projected[0].as_object().unwrap();

        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("title"));
        assert!(!obj.contains_key("price"));
    }

    #[test]
    fn test_exclude_cannot_drop_key_field() {
        let projection = Projection::parse("-id,-location").unwrap();
        let projected = project_list(&[listing()], projection.as_ref()).unwrap();
        let obj = projected[0].as_object().unwrap();

        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("price"));
        assert!(!obj.contains_key("location"));
    }

    #[test]
    fn test_no_projection_returns_everything() {
        let projected = project_list(&[listing()], None).unwrap();
        assert_eq!(projected[0].as_object().unwrap().len(), 4);
    }
}
