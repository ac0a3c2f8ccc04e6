use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A payment with this gateway transaction id already exists.
    #[error("Duplicate transaction id: {0}")]
    DuplicateTransactionId(String),

    /// A row violated a constraint or could not be decoded into a domain type.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
