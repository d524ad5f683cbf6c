// ============================================================================
// Persistence Layer
// ============================================================================
//
// - core:       aggregate, mapper, model and clock contracts
// - store:      document store client contract and its backends
// - repository: generic repository built on the two above
//
// ============================================================================

pub mod core;
pub mod repository;
pub mod store;

pub use self::core::{Aggregate, AggregateId, Clock, Mapper, MappingError, PersistenceModel, SystemClock};
pub use repository::{DocumentRepository, RepositoryError, RepositoryResult};
pub use store::{Document, DocumentStore, Filter, StoreError, StoreSession};
