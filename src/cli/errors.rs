//! CLI-specific error types
//!
//! Every CLI error is fatal: it is printed and the process exits non-zero.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::datastore::DatastoreError;
use crate::query::QueryError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O or JSON error on an input file or stdout
    IoError,
    /// Query rejected or failed
    QueryError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DSQ_CLI_CONFIG_ERROR",
            Self::IoError => "DSQ_CLI_IO_ERROR",
            Self::QueryError => "DSQ_CLI_QUERY_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::QueryError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        Self::query_error(format!("{} ({})", e, e.code()))
    }
}

impl From<DatastoreError> for CliError {
    fn from(e: DatastoreError) -> Self {
        Self::io_error(format!("{} ({})", e, e.code()))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_keeps_code() {
        let err = CliError::from(QueryError::MultiplePrimaryKeyFilter);
        assert_eq!(err.code(), &CliErrorCode::QueryError);
        assert!(err.message().contains("DSQ_MULTIPLE_PK_FILTER"));
        assert!(err.to_string().starts_with("DSQ_CLI_QUERY_ERROR"));
    }
}
