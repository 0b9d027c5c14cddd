//! Continuation cursor persistence
//!
//! Saving a cursor is best-effort. A failure only costs resumability, so
//! `try_save_cursor` logs and counts it and reports `false` instead of
//! returning an error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::datastore::{Cursor, DatastoreError, DatastoreResult};
use crate::observability::{log_event, EngineMetrics, Event};

/// Storage for continuation cursors keyed by query id
pub trait CursorStore: Send + Sync {
    fn save(&self, query_id: &str, cursor: &Cursor) -> DatastoreResult<()>;

    fn load(&self, query_id: &str) -> Option<Cursor>;
}

impl<T: CursorStore + ?Sized> CursorStore for Arc<T> {
    fn save(&self, query_id: &str, cursor: &Cursor) -> DatastoreResult<()> {
        (**self).save(query_id, cursor)
    }

    fn load(&self, query_id: &str) -> Option<Cursor> {
        (**self).load(query_id)
    }
}

/// In-process cursor store
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<String, Cursor>>,
    failing: AtomicBool,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `save` fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CursorStore for MemoryCursorStore {
    fn save(&self, query_id: &str, cursor: &Cursor) -> DatastoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DatastoreError::Unavailable("cursor store offline".into()));
        }
        self.cursors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query_id.to_string(), cursor.clone());
        Ok(())
    }

    fn load(&self, query_id: &str) -> Option<Cursor> {
        self.cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query_id)
            .cloned()
    }
}

/// Saves `cursor` under `query_id`; returns false if that failed
pub fn try_save_cursor(
    store: &dyn CursorStore,
    query_id: &str,
    cursor: DatastoreResult<Cursor>,
    metrics: &EngineMetrics,
) -> bool {
    match cursor.and_then(|c| store.save(query_id, &c)) {
        Ok(()) => true,
        Err(err) => {
            metrics.increment_cursor_save_failures();
            log_event(
                Event::CursorSaveFailed,
                &[("query_id", query_id), ("code", err.code()), ("error", err.to_string().as_str())],
            );
            false
        }
    }
}
