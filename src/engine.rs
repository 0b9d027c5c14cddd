//! Engine entry point
//!
//! `Engine` owns everything a query, insert or update needs:
//! - the backing store
//! - configuration (caps, index layout)
//! - the cursor store for continuation cursors
//! - the per-key lock registry used by updates
//! - metrics
//!
//! Queries borrow the engine, so several can run against it at once.

use crate::config::EngineConfig;
use crate::datastore::{Cursor, Datastore, DatastoreResult, Entity};
use crate::observability::{EngineMetrics, Logger};
use crate::query::{storage_failure, CursorStore, DatastoreQuery, MemoryCursorStore, QueryResult, QuerySpec};
use crate::write::LockRegistry;

pub struct Engine<D: Datastore> {
    store: D,
    config: EngineConfig,
    cursors: Box<dyn CursorStore>,
    locks: LockRegistry,
    metrics: EngineMetrics,
}

impl<D: Datastore> Engine<D> {
    /// Engine with the default configuration and an in-memory cursor store
    pub fn new(store: D) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Engine with `config`; also applies its log level
    pub fn with_config(store: D, config: EngineConfig) -> Self {
        if let Ok(severity) = config.severity() {
            Logger::set_min_severity(severity);
        }
        Self {
            store,
            config,
            cursors: Box::new(MemoryCursorStore::new()),
            locks: LockRegistry::new(),
            metrics: EngineMetrics::new(),
        }
    }

    /// Replaces the cursor store
    pub fn with_cursor_store(mut self, cursors: Box<dyn CursorStore>) -> Self {
        self.cursors = cursors;
        self
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn cursor_store(&self) -> &dyn CursorStore {
        self.cursors.as_ref()
    }

    pub(crate) fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Cursor saved by the query with id `query_id`, if any
    pub fn saved_cursor(&self, query_id: &str) -> Option<Cursor> {
        self.cursors.load(query_id)
    }

    /// Compiles `spec`; validation errors surface here, before any store call
    pub fn query(&self, spec: &QuerySpec) -> QueryResult<DatastoreQuery<'_, D>> {
        DatastoreQuery::from_spec(self, spec)
    }

    /// Compiles and runs `spec` over its own limits, collecting the page
    pub fn fetch_all(&self, spec: &QuerySpec) -> QueryResult<Vec<Entity>> {
        let query = self.query(spec)?;
        let (low, high) = query.limits();
        let page = query.fetch(low, high)?.collect::<QueryResult<Vec<_>>>();
        page
    }

    /// Converts the outcome of a store call, logging and counting failures
    pub(crate) fn storage<T>(&self, operation: &str, result: DatastoreResult<T>) -> QueryResult<T> {
        result.map_err(|err| storage_failure(&self.metrics, operation, err))
    }
}
