//! Error types for the database layer.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded (unknown status, bad timestamp)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A status write outside the lifecycle transition table
    #[error("Invalid transition for {combination}: {from} -> {to}")]
    InvalidTransition {
        combination: String,
        from: String,
        to: String,
    },

    /// Seller or item identifier is empty
    #[error("Invalid combination: {0}")]
    InvalidCombination(String),

    /// A required table or column is missing
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// Connection, pool and lock failures are transient. Schema problems,
    /// decoding failures and lifecycle violations are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlx(err) => !matches!(
                err,
                sqlx::Error::Configuration(_)
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::TypeNotFound { .. }
                    | sqlx::Error::Decode(_)
            ),
            Self::Io(_) => true,
            Self::NotFound(_)
            | Self::InvalidState(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidCombination(_)
            | Self::SchemaMismatch(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(DbError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).is_transient());
        assert!(!DbError::schema_mismatch("changes_log missing").is_transient());
        assert!(!DbError::InvalidTransition {
            combination: "S1/I1".to_string(),
            from: "CHECKED".to_string(),
            to: "NEW".to_string(),
        }
        .is_transient());
    }
}
