use serde_json::{Map, Value};
use std::fmt::{self, Display};

use crate::persistence::core::ID_FIELD;

/// A stored record: flat JSON object with a unique string `id`.
pub type Document = Map<String, Value>;

/// Read the `id` field of a document, if it is a string.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Set every field of `update` on `target`, leaving `id` untouched.
pub fn merge_fields(target: &mut Document, update: Document) {
    for (field, value) in update {
        if field != ID_FIELD {
            target.insert(field, value);
        }
    }
}

/// Selection of documents inside one collection.
///
/// Only full scans and single-field equality are supported.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq { field: String, value: Value },
}

impl Filter {
    pub fn all() -> Self {
        Self::All
    }

    pub fn by_id(id: impl Display) -> Self {
        Self::Eq {
            field: ID_FIELD.to_string(),
            value: Value::String(id.to_string()),
        }
    }

    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The targeted id when this is an equality filter on `id`.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Eq { field, value } if field == ID_FIELD => value.as_str(),
            _ => None,
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => document.get(field) == Some(value),
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Eq { field, value } => write!(f, "{field}={value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_by_id_matches_only_that_id() {
        let filter = Filter::by_id("p1");

        assert_eq!(filter.id(), Some("p1"));
        assert!(filter.matches(&doc(json!({"id": "p1", "name": "Alice"}))));
        assert!(!filter.matches(&doc(json!({"id": "p2", "name": "Alice"}))));
    }

    #[test]
    fn test_field_equality() {
        let filter = Filter::field_eq("name", "Alice");

        assert_eq!(filter.id(), None);
        assert!(filter.matches(&doc(json!({"id": "p1", "name": "Alice"}))));
        assert!(!filter.matches(&doc(json!({"id": "p1"}))));
    }

    #[test]
    fn test_filters_compare_by_value() {
        let filter = Filter::field_eq("name", "Alice");

        assert!(filter.eq(&Filter::field_eq("name", "Alice")));
        assert_ne!(filter, Filter::field_eq("name", "Bob"));
        assert_ne!(Filter::by_id("p1"), Filter::field_eq("name", "p1"));
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(Filter::all().matches(&Document::new()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Filter::all().to_string(), "*");
        assert_eq!(Filter::field_eq("name", "Alice").to_string(), "name=\"Alice\"");
    }

    #[test]
    fn test_document_id_requires_string() {
        assert_eq!(document_id(&doc(json!({"id": "p1"}))), Some("p1"));
        assert_eq!(document_id(&doc(json!({"id": 7}))), None);
    }
}
