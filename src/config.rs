//! Engine configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! is a valid configuration.
//!
//! ```json
//! {
//!   "max_in_combinations": 30,
//!   "exclusion_count_cap": 2000,
//!   "log_level": "warn",
//!   "indexes": { "unindexed": { "Post": ["body"] } }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which columns of each kind are stored without an index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// kind -> unindexed columns
    #[serde(default)]
    pub unindexed: HashMap<String, HashSet<String>>,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: declares `columns` of `kind` unindexed
    pub fn with_unindexed<I, S>(mut self, kind: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unindexed
            .entry(kind.into())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn is_unindexed(&self, kind: &str, column: &str) -> bool {
        self.unindexed
            .get(kind)
            .map_or(false, |columns| columns.contains(column))
    }

    /// Unindexed columns of `kind`, sorted
    pub fn unindexed_columns(&self, kind: &str) -> Vec<String> {
        let mut columns: Vec<String> = self
            .unindexed
            .get(kind)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        columns.sort();
        columns
    }
}

/// Tunables of the query engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on sub-queries produced by an `in` expansion
    #[serde(default = "default_max_in_combinations")]
    pub max_in_combinations: usize,

    /// Fetch cap used to count when exclusions prevent a native count
    #[serde(default = "default_exclusion_count_cap")]
    pub exclusion_count_cap: usize,

    /// Minimum log severity: trace, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub indexes: IndexConfig,
}

fn default_max_in_combinations() -> usize {
    30
}

fn default_exclusion_count_cap() -> usize {
    2000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_combinations: default_max_in_combinations(),
            exclusion_count_cap: default_exclusion_count_cap(),
            log_level: default_log_level(),
            indexes: IndexConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_indexes(mut self, indexes: IndexConfig) -> Self {
        self.indexes = indexes;
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_in_combinations == 0 {
            return Err(ConfigError::Invalid("max_in_combinations must be > 0".into()));
        }
        if self.exclusion_count_cap == 0 {
            return Err(ConfigError::Invalid("exclusion_count_cap must be > 0".into()));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_in_combinations, 30);
        assert_eq!(config.exclusion_count_cap, 2000);
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_empty_object_is_default() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json_str(
            r#"{"max_in_combinations": 10, "indexes": {"unindexed": {"Post": ["body"]}}}"#,
        )
        .unwrap();
        assert_eq!(config.max_in_combinations, 10);
        assert!(config.indexes.is_unindexed("Post", "body"));
        assert!(!config.indexes.is_unindexed("Post", "title"));
        assert!(!config.indexes.is_unindexed("User", "body"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"max_in_combinations": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"log_level": "chatty"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"exclusion_count_cap": 50, "log_level": "error"}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.exclusion_count_cap, 50);
        assert_eq!(config.severity().unwrap(), Severity::Error);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unindexed_columns_sorted() {
        let indexes = IndexConfig::new().with_unindexed("Post", ["z", "a"]);
        assert_eq!(indexes.unindexed_columns("Post"), vec!["a", "z"]);
        assert!(indexes.unindexed_columns("User").is_empty());
    }
}
