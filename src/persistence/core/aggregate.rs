use std::fmt::{Debug, Display};

// ============================================================================
// Aggregate Root - Persistence Contract
// ============================================================================
//
// Key Principles:
// 1. Aggregates own their invariants and expose them through `validate()`
// 2. Repositories never mutate an aggregate, they only read it
// 3. Identity is compared by value and has a stable string form
//
// This is the GENERIC aggregate trait that works for ANY stored aggregate.
//
// ============================================================================

/// Identity of an aggregate inside one collection.
///
/// The `Display` output is the value written to the `id` field of the
/// stored record, so two identifiers that compare equal must render the
/// same string.
pub trait AggregateId: Display + Debug + Clone + Eq + Send + Sync {}

impl<T> AggregateId for T where T: Display + Debug + Clone + Eq + Send + Sync {}

/// Generic Aggregate trait - every persisted aggregate implements this
///
/// Type Parameters:
/// - `Id`: The identifier type for this aggregate
/// - `Error`: The error type for invariant violations
pub trait Aggregate: Send + Sync {
    type Id: AggregateId;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get aggregate ID
    fn id(&self) -> &Self::Id;

    /// Check the aggregate's invariants. Must succeed before any write.
    fn validate(&self) -> Result<(), Self::Error>;
}
