use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{Person, PersonId};
use super::errors::PersonError;
use crate::persistence::core::{Aggregate, Mapper, MappingError, PersistenceModel};

// ============================================================================
// Person Persistence Model
// ============================================================================

/// Stored shape of a person, e.g.
/// `{"id":"p1","name":"Alice","document":null,"createdAt":"...","updatedAt":"..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistenceModel for PersonModel {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Person Mapper
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PersonMapper;

impl Mapper for PersonMapper {
    type Aggregate = Person;
    type Model = PersonModel;

    fn to_domain(&self, model: PersonModel) -> Result<Person, MappingError> {
        let person = Person {
            id: PersonId::from(model.id),
            name: model.name,
            document: model.document,
            created_at: model.created_at,
            updated_at: model.updated_at,
        };

        match person.validate() {
            Ok(()) => Ok(person),
            Err(err @ PersonError::InvalidDocument(_)) => Err(MappingError::InvalidField {
                id: person.id.to_string(),
                field: "document",
                reason: err.to_string(),
            }),
            Err(err) => Err(MappingError::InvalidAggregate {
                id: person.id.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn to_persistence(&self, person: &Person) -> PersonModel {
        PersonModel {
            id: person.id.to_string(),
            name: person.name.clone(),
            document: person.document.clone(),
            created_at: person.created_at,
            updated_at: person.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use quickcheck::{Arbitrary, Gen};
    use serde_json::json;

    const LETTERS: &[char] = &['a', 'e', 'i', 'l', 'o', 'r', 's', 'A', 'M', 'Z', ' ', 'é'];
    const DIGITS: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

    fn word(g: &mut Gen, alphabet: &[char], len: usize) -> String {
        (0..len).map(|_| *g.choose(alphabet).unwrap()).collect()
    }

    impl Arbitrary for Person {
        fn arbitrary(g: &mut Gen) -> Self {
            let name_len = usize::arbitrary(g) % 30;
            let mut person = Person::new(
                format!("p{}", u32::arbitrary(g)),
                format!("N{}", word(g, LETTERS, name_len)),
            );

            if bool::arbitrary(g) {
                let len = *g.choose(&[11, 14]).unwrap();
                person.document = Some(word(g, DIGITS, len));
            }

            if bool::arbitrary(g) {
                let created = Utc
                    .timestamp_opt(i64::from(u32::arbitrary(g)), u32::arbitrary(g) % 1_000_000_000)
                    .unwrap();
                person.created_at = Some(created);
                person.updated_at = Some(created + Duration::milliseconds(i64::from(u16::arbitrary(g))));
            }

            person
        }
    }

    #[quickcheck]
    fn mapping_round_trip_preserves_fields(person: Person) -> bool {
        let mapper = PersonMapper;
        mapper.to_domain(mapper.to_persistence(&person)).ok() == Some(person)
    }

    #[quickcheck]
    fn stored_json_round_trip_preserves_fields(person: Person) -> bool {
        let mapper = PersonMapper;
        let stored = serde_json::to_value(mapper.to_persistence(&person)).unwrap();
        let model: PersonModel = serde_json::from_value(stored).unwrap();
        mapper.to_domain(model).ok() == Some(person)
    }

    #[test]
    fn test_model_uses_camel_case_fields() {
        let mut person = Person::new("p1", "Alice");
        person.created_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        let stored = serde_json::to_value(PersonMapper.to_persistence(&person)).unwrap();
        assert_eq!(
            stored,
            json!({
                "id": "p1",
                "name": "Alice",
                "document": null,
                "createdAt": "2024-05-01T12:00:00Z",
                "updatedAt": null,
            })
        );
    }

    #[test]
    fn test_invalid_stored_record_is_a_mapping_error() {
        let model = PersonModel {
            id: "p9".to_string(),
            name: "".to_string(),
            document: None,
            created_at: None,
            updated_at: None,
        };

        let err = PersonMapper.to_domain(model).unwrap_err();
        assert!(matches!(err, MappingError::InvalidAggregate { ref id, .. } if id == "p9"));
    }

    #[test]
    fn test_bad_stored_document_names_the_field() {
        let model = PersonModel {
            id: "p9".to_string(),
            name: "Alice".to_string(),
            document: Some("12-34".to_string()),
            created_at: None,
            updated_at: None,
        };

        let err = PersonMapper.to_domain(model).unwrap_err();
        assert!(matches!(err, MappingError::InvalidField { field: "document", .. }));
    }
}
