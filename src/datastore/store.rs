//! Backing store interface
//!
//! The engine consumes exactly these primitives. Each call is one
//! synchronous round trip with no retry.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::errors::DatastoreResult;
use super::key::Key;
use super::query::NativeQuery;

/// Opaque continuation token produced by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result window requested from `Datastore::run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Results to skip
    pub offset: usize,
    /// Maximum results to return (`None` = unbounded)
    pub limit: Option<usize>,
}

impl RunOptions {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn window(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// Lazy, forward-only results of one native query.
///
/// Consuming the stream advances the store's result window; running the
/// query again is the only way to restart.
pub trait ResultStream: Iterator<Item = DatastoreResult<Entity>> {
    /// Cursor positioned after the last entity yielded
    fn compiled_cursor(&self) -> DatastoreResult<Cursor>;
}

/// Primitives offered by the backing store
pub trait Datastore: Send + Sync {
    /// Batch get by key; `None` for keys with no entity
    fn get(&self, keys: &[Key]) -> DatastoreResult<Vec<Option<Entity>>>;

    /// Batch put. Incomplete keys are completed; the stored keys are returned
    /// in input order.
    fn put(&self, entities: Vec<Entity>) -> DatastoreResult<Vec<Key>>;

    /// Batch delete
    fn delete(&self, keys: &[Key]) -> DatastoreResult<()>;

    /// Executes a native query
    fn run<'a>(
        &'a self,
        query: &NativeQuery,
        options: RunOptions,
    ) -> DatastoreResult<Box<dyn ResultStream + 'a>>;

    /// Counts native query results, up to `limit` when given
    fn count(&self, query: &NativeQuery, limit: Option<usize>) -> DatastoreResult<usize>;

    /// Reserves `count` numeric ids for `kind` under `parent`
    fn allocate_ids(&self, parent: Option<&Key>, kind: &str, count: usize) -> DatastoreResult<Range<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options() {
        assert_eq!(RunOptions::unbounded().limit, None);
        let window = RunOptions::window(3, 7);
        assert_eq!(window.offset, 3);
        assert_eq!(window.limit, Some(7));
    }

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = Cursor::new("abc");
        assert_eq!(cursor.as_str(), "abc");
        assert_eq!(cursor.to_string(), "abc");
    }
}
