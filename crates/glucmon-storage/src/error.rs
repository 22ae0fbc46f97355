use chrono::{DateTime, Utc};

use crate::Category;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use glucmon_storage::{Category, StorageError};
///
/// let err = StorageError::NotFound {
///     category: Category::Dose,
///     id: "7201847362918400001".to_string(),
/// };
/// assert!(err.to_string().contains("dose"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record with this id (or short reference) exists.
    #[error("Storage: {category} not found (id={id})")]
    NotFound { category: Category, id: String },

    /// A short reference matched more than one recent record.
    #[error("Storage: reference '{token}' matches {matches} recent {category} records")]
    AmbiguousReference {
        category: Category,
        token: String,
        matches: usize,
    },

    /// The record's time lies after the current time.
    #[error("Storage: {category} time {time} is in the future")]
    FutureTimestamp {
        category: Category,
        time: DateTime<Utc>,
    },

    /// A stored column could not be mapped back to its domain type.
    #[error("Storage: unexpected value in {category}.{column}: '{value}'")]
    Corrupt {
        category: Category,
        column: &'static str,
        value: String,
    },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the error describes the request rather than the backend.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AmbiguousReference { .. } | Self::FutureTimestamp { .. }
        )
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
