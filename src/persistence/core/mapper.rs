use super::aggregate::Aggregate;
use super::model::PersistenceModel;

// ============================================================================
// Mapper - Domain <-> Persistence translation
// ============================================================================
//
// Mappers are stateless and referentially transparent. `to_domain` is the
// single reconstruction boundary: a malformed stored record surfaces here
// as a `MappingError` instead of producing an invalid aggregate.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Stored record `{id}` could not be decoded: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Persistence model did not serialize to a document object")]
    NotADocument,

    #[error("Stored record `{id}` violates aggregate invariants: {reason}")]
    InvalidAggregate { id: String, reason: String },

    #[error("Stored record `{id}` has invalid field `{field}`: {reason}")]
    InvalidField {
        id: String,
        field: &'static str,
        reason: String,
    },
}

/// Bidirectional transform between an aggregate and its stored shape.
pub trait Mapper: Send + Sync {
    type Aggregate: Aggregate;
    type Model: PersistenceModel;

    /// Rebuild an aggregate from a stored record.
    fn to_domain(&self, model: Self::Model) -> Result<Self::Aggregate, MappingError>;

    /// Produce the stored record for an aggregate. Total over valid aggregates.
    fn to_persistence(&self, aggregate: &Self::Aggregate) -> Self::Model;
}
