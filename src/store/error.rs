//! Mirror store error types

use crate::chain::types::Address;
use thiserror::Error;

/// Errors that can occur in the mirror store
#[derive(Error, Debug)]
pub enum StoreError {
    /// An entry with this key already exists
    #[error("Campaign {0} is already stored")]
    ConstraintViolation(Address),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The database was written by a newer schema revision
    #[error("Unsupported store schema revision {found} (expected {expected})")]
    UnsupportedSchema { found: i64, expected: i64 },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::ConstraintViolation(Address([0xab; 20]));
        assert_eq!(
            err.to_string(),
            "Campaign 0xabababababababababababababababababababab is already stored"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
