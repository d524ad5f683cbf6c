use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::errors::PersonError;
use crate::persistence::core::Aggregate;

pub const MAX_NAME_LEN: usize = 120;

// ============================================================================
// Person Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    /// Fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PersonId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    // Identity
    pub id: PersonId,

    pub name: String,
    /// Tax document number, digits only.
    pub document: Option<String>,

    // Audit Trail, filled by the repository on first insert
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(id: impl Into<PersonId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            document: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl Aggregate for Person {
    type Id = PersonId;
    type Error = PersonError;

    fn id(&self) -> &PersonId {
        &self.id
    }

    fn validate(&self) -> Result<(), PersonError> {
        if self.id.as_str().trim().is_empty() {
            return Err(PersonError::EmptyId);
        }

        let name = self.name.trim();
        if name.is_empty() {
            return Err(PersonError::EmptyName);
        }
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(PersonError::NameTooLong(len));
        }

        if let Some(document) = &self.document {
            let digits = document.chars().all(|c| c.is_ascii_digit());
            if !digits || !matches!(document.len(), 11 | 14) {
                return Err(PersonError::InvalidDocument(document.clone()));
            }
        }

        if let (Some(created_at), Some(updated_at)) = (self.created_at, self.updated_at) {
            if updated_at < created_at {
                return Err(PersonError::UpdatedBeforeCreated);
            }
        }

        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_valid_person() {
        let person = Person::new("p1", "Alice").with_document("12345678901");
        assert!(person.validate().is_ok());
        assert_eq!(person.id().to_string(), "p1");
    }

    #[test]
    fn test_rejects_blank_name_and_id() {
        assert_eq!(Person::new("p1", "   ").validate(), Err(PersonError::EmptyName));
        assert_eq!(Person::new("", "Alice").validate(), Err(PersonError::EmptyId));
    }

    #[test]
    fn test_rejects_long_name() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            Person::new("p1", name).validate(),
            Err(PersonError::NameTooLong(MAX_NAME_LEN + 1))
        );
    }

    #[test]
    fn test_rejects_malformed_document() {
        for document in ["123", "1234567890a", "123.456.789-01"] {
            let person = Person::new("p1", "Alice").with_document(document);
            assert_eq!(
                person.validate(),
                Err(PersonError::InvalidDocument(document.to_string()))
            );
        }
        assert!(Person::new("p1", "Acme").with_document("12345678000190").validate().is_ok());
    }

    #[test]
    fn test_rejects_updated_before_created() {
        let now = Utc::now();
        let mut person = Person::new("p1", "Alice");
        person.created_at = Some(now);
        person.updated_at = Some(now - Duration::seconds(1));

        assert_eq!(person.validate(), Err(PersonError::UpdatedBeforeCreated));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(PersonId::generate(), PersonId::generate());
    }
}
