use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness rule was hit, e.g. a second active run for a group.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<pairing_types::EdgeSetViolation> for StorageError {
    fn from(value: pairing_types::EdgeSetViolation) -> Self {
        StorageError::InvariantViolation(value.to_string())
    }
}
