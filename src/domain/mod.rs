// ============================================================================
// Domain Layer - Aggregates Stored Through the Repository
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Aggregate and identifier
// - Errors
// - Persistence model and mapper
// - Repository
//
// Nothing here knows which document store backs the repository.
//
// ============================================================================

pub mod person;
