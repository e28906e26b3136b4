//! Engine errors and how the scheduler should react to them.

use marketwatch_db::DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

/// What a caller should do after a failed scan or cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing was written; try again on the next tick
    Retry,
    /// The input was bad; drop it and keep scheduling
    Reject,
    /// Configuration or storage layout is broken; stop scheduling
    Halt,
}

#[derive(Error, Debug)]
pub enum MonitorError {
    /// Malformed snapshot input
    #[error("Invalid snapshot: {0}")]
    Validation(String),

    /// Bad configuration value or file
    #[error("Configuration error: {0}")]
    Config(String),

    /// The snapshot source could not be read
    #[error("Snapshot feed error: {0}")]
    Feed(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl MonitorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Validation(_) => Disposition::Reject,
            Self::Config(_) => Disposition::Halt,
            // The capture pipeline may not have written this cycle's file yet
            Self::Feed(_) => Disposition::Retry,
            Self::Storage(DbError::InvalidCombination(_)) => Disposition::Reject,
            Self::Storage(err) if err.is_transient() => Disposition::Retry,
            Self::Storage(_) => Disposition::Halt,
        }
    }
}
