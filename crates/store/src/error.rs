//! Store error types

use thiserror::Error;

/// Configuration store errors
///
/// "Not found" is not an error anywhere in the store API; lookups
/// return `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] turso::Error),

    /// Unique constraint violation
    #[error("{entity} already exists: {name}")]
    AlreadyExists { entity: &'static str, name: String },

    /// A lookup by name matched more than one row
    #[error("ambiguous {entity} name: {name}")]
    Ambiguous { entity: &'static str, name: String },

    /// A stored value could not be decoded
    #[error("corrupt {column} value: {message}")]
    Corrupt {
        column: &'static str,
        message: String,
    },
}

impl StoreError {
    /// Create an already-exists error
    pub fn already_exists(entity: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            name: name.into(),
        }
    }

    /// Create an ambiguous-name error
    pub fn ambiguous(entity: &'static str, name: impl Into<String>) -> Self {
        Self::Ambiguous {
            entity,
            name: name.into(),
        }
    }

    /// Create a corrupt-value error
    pub fn corrupt(column: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            column,
            message: message.into(),
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
