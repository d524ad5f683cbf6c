// ============================================================================
// Store Errors
// ============================================================================
//
// Every error a store client can raise. The repository never translates
// these: callers see exactly what the store reported.
//
// ============================================================================

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate id `{id}` in collection `{collection}`")]
    DuplicateKey { collection: String, id: String },

    #[error("Document has no string `id` field")]
    MissingId,

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session has already ended")]
    SessionEnded,

    #[error("No transaction in progress on this session")]
    NoTransaction,

    #[error("A transaction is already in progress on this session")]
    TransactionInProgress,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap a driver error without losing its concrete type.
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }

    pub fn duplicate_key(collection: &str, id: &str) -> Self {
        Self::DuplicateKey {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}
