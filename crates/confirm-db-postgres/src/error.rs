//! Error types for the PostgreSQL store.

use confirm_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored document failed to decode.
    #[error("Corrupt document {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PostgresError {
    /// Whether the error means the database could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Database(
                SqlxError::Io(_)
                    | SqlxError::Tls(_)
                    | SqlxError::PoolTimedOut
                    | SqlxError::PoolClosed
                    | SqlxError::WorkerCrashed
            )
        )
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        if err.is_connectivity() {
            return StorageError::unavailable(err.to_string());
        }
        match err {
            PostgresError::Decode { key, source } => StorageError::corrupt(key, source.to_string()),
            other => StorageError::internal(other.to_string()),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
