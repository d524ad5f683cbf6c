// ============================================================================
// Person Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersonError {
    #[error("Person id cannot be empty")]
    EmptyId,

    #[error("Person name cannot be empty")]
    EmptyName,

    #[error("Person name is too long: {0} characters")]
    NameTooLong(usize),

    #[error("Invalid document number `{0}`: expected 11 or 14 digits")]
    InvalidDocument(String),

    #[error("Person was updated before it was created")]
    UpdatedBeforeCreated,
}
