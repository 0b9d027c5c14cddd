//! Query engine error types
//!
//! Error codes:
//! - DSQ_UNSUPPORTED_LOOKUP (validation)
//! - DSQ_MULTIPLE_PK_FILTER (validation)
//! - DSQ_MULTIPLE_NEGATED_EXACT (validation)
//! - DSQ_NON_NEGATABLE_LOOKUP (validation)
//! - DSQ_MULTIPLE_INEQUALITY_FIELDS (validation)
//! - DSQ_TOO_MANY_IN_COMBINATIONS (validation)
//! - DSQ_UNINDEXED_FIELD_FILTER (validation)
//! - DSQ_AMBIGUOUS_PARENT_TYPE (validation)
//! - DSQ_INVALID_VALUE (validation)
//! - DSQ_STORAGE_ERROR (storage)
//!
//! Validation errors are raised while filters are added, before any call
//! into the backing store. Storage errors wrap whatever the store raised.

use thiserror::Error;

use crate::datastore::DatastoreError;

use super::ast::LookupKind;

/// Result type for engine operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors surfaced by query construction, execution and writes
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Lookup type '{0}' isn't supported")]
    UnsupportedLookup(String),

    #[error("Can't apply multiple AND filters on the primary key; use an 'in' lookup instead")]
    MultiplePrimaryKeyFilter,

    #[error("Can't exclude more than one 'exact' filter")]
    MultipleNegatedExactFilter,

    #[error("Lookup type '{0}' can't be negated")]
    NonNegatableLookup(LookupKind),

    #[error("Can't have inequality filters on multiple fields (here: '{first}' and '{second}')")]
    MultipleInequalityFields { first: String, second: String },

    #[error("Can't query against more than {max} 'in' filter value combinations (requested {requested})")]
    TooManyInCombinations { requested: usize, max: usize },

    #[error("Column '{column}' of kind '{kind}' is not indexed, so it can't be filtered on")]
    UnindexedFieldFilter { kind: String, column: String },

    #[error("Tried to set ancestor of incorrect type: expected '{expected}', got '{found}'")]
    AmbiguousParentType { expected: String, found: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Database error: {0}")]
    Storage(#[from] DatastoreError),
}

impl QueryError {
    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::UnsupportedLookup(_) => "DSQ_UNSUPPORTED_LOOKUP",
            QueryError::MultiplePrimaryKeyFilter => "DSQ_MULTIPLE_PK_FILTER",
            QueryError::MultipleNegatedExactFilter => "DSQ_MULTIPLE_NEGATED_EXACT",
            QueryError::NonNegatableLookup(_) => "DSQ_NON_NEGATABLE_LOOKUP",
            QueryError::MultipleInequalityFields { .. } => "DSQ_MULTIPLE_INEQUALITY_FIELDS",
            QueryError::TooManyInCombinations { .. } => "DSQ_TOO_MANY_IN_COMBINATIONS",
            QueryError::UnindexedFieldFilter { .. } => "DSQ_UNINDEXED_FIELD_FILTER",
            QueryError::AmbiguousParentType { .. } => "DSQ_AMBIGUOUS_PARENT_TYPE",
            QueryError::InvalidValue(_) => "DSQ_INVALID_VALUE",
            QueryError::Storage(_) => "DSQ_STORAGE_ERROR",
        }
    }

    /// Returns true for construction-time validation failures
    pub fn is_validation(&self) -> bool {
        !matches!(self, QueryError::Storage(_))
    }

    pub(crate) fn invalid_value(reason: impl Into<String>) -> Self {
        QueryError::InvalidValue(reason.into())
    }
}
