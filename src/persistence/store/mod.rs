// ============================================================================
// Document Store - Storage-facing client contract
// ============================================================================
//
// The repository consumes exactly this capability set. Backends:
// - `InMemoryStore`: process-local collections, used by tests and demos
// - `ScyllaStore`: JSON documents in a ScyllaDB table
//
// Every data operation takes an optional session. Inside an active
// transaction the backend stages writes until commit.
//
// ============================================================================

pub mod error;
pub mod filter;
pub mod memory;
pub mod scylladb;
pub mod write_set;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use filter::{document_id, merge_fields, Document, Filter};
pub use memory::{Fault, InMemorySession, InMemoryStore};
pub use scylladb::{ScyllaSession, ScyllaStore};
pub use write_set::{PendingWrite, StagedWrite, WriteSet};

/// Client for a document-oriented store holding named collections.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    type Session: StoreSession;

    /// First document matching `filter`, `None` when nothing matches.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<Option<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<Vec<Document>>;

    /// Insert a new document. A taken id is `StoreError::DuplicateKey`.
    async fn create(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Self::Session>,
    ) -> StoreResult<()>;

    /// Set the fields of `update` on the first matching document.
    /// Returns the number of matched documents (0 or 1).
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
        session: Option<&Self::Session>,
    ) -> StoreResult<u64>;

    /// Remove the first matching document. Returns the number removed.
    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Self::Session>,
    ) -> StoreResult<u64>;

    async fn start_session(&self) -> StoreResult<Self::Session>;
}

/// Transactional context handed out by [`DocumentStore::start_session`].
#[async_trait]
pub trait StoreSession: Send + Sync + 'static {
    async fn start_transaction(&self) -> StoreResult<()>;

    async fn commit_transaction(&self) -> StoreResult<()>;

    async fn abort_transaction(&self) -> StoreResult<()>;

    /// Release the session. Discards any transaction still open.
    async fn end_session(&self) -> StoreResult<()>;
}
