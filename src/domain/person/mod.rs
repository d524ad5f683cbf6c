// ============================================================================
// Person Domain - Sample Aggregate Stored Through the Generic Repository
// ============================================================================
//
// - Aggregate (Person, PersonId) with its own invariants
// - Errors (PersonError)
// - Persistence model and mapper (PersonModel, PersonMapper)
// - Repository (PersonRepository) adding person-specific lookups
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod mapper;
pub mod repository;

// Re-export for convenience
pub use aggregate::*;
pub use errors::*;
pub use mapper::*;
pub use repository::*;
