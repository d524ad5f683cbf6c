use std::error::Error;

use crate::persistence::core::MappingError;
use crate::persistence::store::StoreError;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The aggregate rejected itself; nothing was sent to the store.
    #[error("Aggregate is invalid: {0}")]
    Validation(#[source] Box<dyn Error + Send + Sync>),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Repository is already bound to a session; transactions do not nest")]
    NestedTransaction,
}

impl RepositoryError {
    pub fn validation<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Validation(Box::new(error))
    }

    /// The aggregate's own validation error, when it is of type `E`.
    pub fn validation_error<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Validation(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(source) => Some(source),
            _ => None,
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(StoreError::DuplicateKey { .. }))
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Store(StoreError::Serialization(error))
    }
}
