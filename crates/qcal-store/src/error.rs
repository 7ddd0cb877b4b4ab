//! Error handling for the parameter store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing parameters.
///
/// A field that does not exist is *not* an error: reads return `None` or
/// [`ParameterValue::NotFound`](crate::ParameterValue::NotFound) and callers
/// treat it as "not yet calibrated".
#[derive(Error, Debug)]
pub enum StoreError {
    /// A stored value could not be interpreted.
    #[error("Invalid value for {key}/{field}: '{value}'")]
    InvalidValue {
        key: String,
        field: String,
        value: String,
    },

    /// SQLite database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A lock was poisoned by a panicking writer.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::InvalidValue {
            key: "transmons:q00".to_string(),
            field: "clock_freqs:f01".to_string(),
            value: "four".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for transmons:q00/clock_freqs:f01: 'four'"
        );
    }
}
