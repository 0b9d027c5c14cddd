//! Backing store error types
//!
//! Error codes:
//! - DS_NOT_FOUND
//! - DS_BAD_REQUEST
//! - DS_BAD_VALUE
//! - DS_UNAVAILABLE
//! - DS_INTERNAL

use thiserror::Error;

/// Result type for backing store operations
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Errors raised by a `Datastore` implementation.
///
/// The query engine never inspects these beyond their code; they are
/// wrapped into a single storage error kind before reaching callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatastoreError {
    /// Requested entity or cursor does not exist
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The query violates a native engine restriction
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A property value cannot be stored
    #[error("Bad value: {0}")]
    BadValue(String),

    /// The store could not be reached
    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    /// Unexpected internal failure
    #[error("Internal datastore error: {0}")]
    Internal(String),
}

impl DatastoreError {
    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            DatastoreError::NotFound(_) => "DS_NOT_FOUND",
            DatastoreError::BadRequest(_) => "DS_BAD_REQUEST",
            DatastoreError::BadValue(_) => "DS_BAD_VALUE",
            DatastoreError::Unavailable(_) => "DS_UNAVAILABLE",
            DatastoreError::Internal(_) => "DS_INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DatastoreError::NotFound("k".into()).code(), "DS_NOT_FOUND");
        assert_eq!(DatastoreError::BadRequest("q".into()).code(), "DS_BAD_REQUEST");
        assert_eq!(DatastoreError::BadValue("v".into()).code(), "DS_BAD_VALUE");
        assert_eq!(DatastoreError::Unavailable("x".into()).code(), "DS_UNAVAILABLE");
    }

    #[test]
    fn test_error_display() {
        let err = DatastoreError::BadRequest("two inequality properties".into());
        assert!(err.to_string().contains("two inequality properties"));
    }
}
