use serde::{de::DeserializeOwned, Serialize};

/// Field holding the aggregate identifier. Written once, never updated.
pub const ID_FIELD: &str = "id";

/// Field holding the first insert time. Written once, never updated.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Field refreshed on every successful update.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Flat record shape written to a document store.
///
/// Implementors serialize to a JSON object that carries [`ID_FIELD`],
/// [`CREATED_AT_FIELD`] and [`UPDATED_AT_FIELD`] next to their domain
/// fields. Use `#[serde(rename_all = "camelCase")]` on the struct to get
/// the expected field names.
pub trait PersistenceModel: Serialize + DeserializeOwned + Send + Sync {
    /// Stored identifier, equal to the aggregate id's string form.
    fn id(&self) -> &str;
}
