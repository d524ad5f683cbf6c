// ============================================================================
// Persistence Core - Generic Domain-Side Abstractions
// ============================================================================
//
// This module contains GENERIC contracts shared by every repository:
// - No domain-specific code (no Person, Order, etc.)
// - No storage-specific code (no ScyllaDB, no in-memory maps)
//
// ============================================================================

pub mod aggregate;
pub mod clock;
pub mod mapper;
pub mod model;

// Re-export core types for convenience
pub use aggregate::{Aggregate, AggregateId};
pub use clock::{next_update_timestamp, timestamp_resolution, Clock, SystemClock};
pub use mapper::{Mapper, MappingError};
pub use model::{PersistenceModel, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
