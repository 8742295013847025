use thiserror::Error;

/// Errors that can occur when interacting with the catalog store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update found the row in a different status than the
    /// caller last read. Nothing was written.
    #[error(
        "Status conflict for {entity} {id}: expected {expected}, found {actual}"
    )]
    StatusConflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    /// The row to update does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique key is already taken (e.g. an order number).
    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A persisted value could not be mapped back to a domain type.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<common::UnknownStatus> for StoreError {
    fn from(e: common::UnknownStatus) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for catalog store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
