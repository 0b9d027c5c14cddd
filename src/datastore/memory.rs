//! In-process datastore
//!
//! Implements the native query model with the same restrictions as a real
//! hierarchical-key store:
//! - filters are AND-ed, at most one property may carry inequalities
//! - entities lacking a filtered or sorted property (or holding it
//!   unindexed) are invisible to that query
//! - list properties match when any element matches
//! - empty lists cannot be stored
//!
//! Also records call statistics and supports failure injection for tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::entity::Entity;
use super::errors::{DatastoreError, DatastoreResult};
use super::key::{Key, KeyId};
use super::ordering::{compare_entities, sort_value};
use super::query::{NativeQuery, KEY_PROPERTY};
use super::store::{Cursor, Datastore, ResultStream, RunOptions};
use super::value::Value;

/// Store primitives, for statistics and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
    Delete,
    Run,
    Count,
    AllocateIds,
}

impl Operation {
    fn index(self) -> usize {
        match self {
            Operation::Get => 0,
            Operation::Put => 1,
            Operation::Delete => 2,
            Operation::Run => 3,
            Operation::Count => 4,
            Operation::AllocateIds => 5,
        }
    }
}

/// Datastore held entirely in memory
#[derive(Debug)]
pub struct MemoryDatastore {
    entities: RwLock<BTreeMap<Key, Entity>>,
    next_id: AtomicI64,
    calls: [AtomicUsize; 6],
    run_requests: Mutex<Vec<RunOptions>>,
    failing: Mutex<HashSet<Operation>>,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            calls: Default::default(),
            run_requests: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Creates a store pre-loaded with `entities`
    pub fn with_entities(entities: Vec<Entity>) -> DatastoreResult<Self> {
        let store = Self::new();
        store.put(entities)?;
        store.reset_stats();
        Ok(store)
    }

    /// Number of stored entities
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .map(|map| map.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of calls made to `op` since creation or the last reset
    pub fn calls(&self, op: Operation) -> usize {
        self.calls[op.index()].load(Ordering::Relaxed)
    }

    /// Windows requested by every `run` call, oldest first
    pub fn run_requests(&self) -> Vec<RunOptions> {
        self.run_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset_stats(&self) {
        for counter in &self.calls {
            counter.store(0, Ordering::Relaxed);
        }
        self.run_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Makes every subsequent call to `op` fail with `Unavailable`
    pub fn fail(&self, op: Operation) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    /// Clears all injected failures
    pub fn heal(&self) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn enter(&self, op: Operation) -> DatastoreResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::Relaxed);
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(&op) {
            return Err(DatastoreError::Unavailable(format!("{:?} failed (injected)", op)));
        }
        Ok(())
    }

    fn read_map(&self) -> DatastoreResult<std::sync::RwLockReadGuard<'_, BTreeMap<Key, Entity>>> {
        self.entities
            .read()
            .map_err(|_| DatastoreError::Internal("entity map lock poisoned".into()))
    }

    fn write_map(&self) -> DatastoreResult<std::sync::RwLockWriteGuard<'_, BTreeMap<Key, Entity>>> {
        self.entities
            .write()
            .map_err(|_| DatastoreError::Internal("entity map lock poisoned".into()))
    }

    /// Matches and sorts the full result set of `query`
    fn evaluate(&self, query: &NativeQuery) -> DatastoreResult<Vec<Entity>> {
        let inequality_columns: BTreeSet<&str> = query
            .filters()
            .filter(|(_, op, _)| op.is_inequality())
            .map(|(column, _, _)| column)
            .collect();
        if inequality_columns.len() > 1 {
            return Err(DatastoreError::BadRequest(format!(
                "inequality filters on more than one property: {:?}",
                inequality_columns
            )));
        }

        let map = self.read_map()?;
        let mut matched: Vec<Entity> = map
            .values()
            .filter(|e| e.key().kind() == query.kind())
            .filter(|e| query.ancestor().map_or(true, |a| e.key().has_ancestor(a)))
            .filter(|e| Self::matches_filters(e, query))
            .filter(|e| {
                query.orders().iter().all(|(column, direction)| {
                    column == KEY_PROPERTY
                        || (e.is_indexed(column) && sort_value(e, column, *direction).is_some())
                })
            })
            .cloned()
            .collect();
        drop(map);

        matched.sort_by(|a, b| compare_entities(a, b, query.orders()));
        Ok(matched)
    }

    fn matches_filters(entity: &Entity, query: &NativeQuery) -> bool {
        query.filters().all(|(column, op, expected)| {
            if column == KEY_PROPERTY {
                return op.test(&Value::Key(entity.key().clone()), expected);
            }
            if !entity.is_indexed(column) {
                return false;
            }
            match entity.get(column) {
                None => false,
                Some(Value::List(items)) => items.iter().any(|item| op.test(item, expected)),
                Some(actual) => op.test(actual, expected),
            }
        })
    }

    fn encode_cursor(position: usize) -> Cursor {
        Cursor::new(STANDARD.encode(format!("pos:{}", position)))
    }

    fn decode_cursor(cursor: &Cursor) -> DatastoreResult<usize> {
        let bad = || DatastoreError::BadRequest(format!("invalid cursor: {}", cursor));
        let bytes = STANDARD.decode(cursor.as_str()).map_err(|_| bad())?;
        let text = String::from_utf8(bytes).map_err(|_| bad())?;
        text.strip_prefix("pos:")
            .and_then(|n| n.parse().ok())
            .ok_or_else(bad)
    }
}

/// Materialized window of one `run` call
struct MemoryResults {
    items: std::vec::IntoIter<Entity>,
    position: usize,
    keys_only: bool,
}

impl Iterator for MemoryResults {
    type Item = DatastoreResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let entity = self.items.next()?;
        self.position += 1;
        if self.keys_only {
            Some(Ok(entity.key_only()))
        } else {
            Some(Ok(entity))
        }
    }
}

impl ResultStream for MemoryResults {
    fn compiled_cursor(&self) -> DatastoreResult<Cursor> {
        Ok(MemoryDatastore::encode_cursor(self.position))
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, keys: &[Key]) -> DatastoreResult<Vec<Option<Entity>>> {
        self.enter(Operation::Get)?;
        let map = self.read_map()?;
        Ok(keys.iter().map(|k| map.get(k).cloned()).collect())
    }

    fn put(&self, entities: Vec<Entity>) -> DatastoreResult<Vec<Key>> {
        self.enter(Operation::Put)?;

        for entity in &entities {
            if let Some((name, _)) = entity.properties().iter().find(|(_, v)| v.is_empty_list()) {
                return Err(DatastoreError::BadValue(format!(
                    "property '{}' of {} is an empty list",
                    name,
                    entity.key()
                )));
            }
            if let Some(parent) = entity.key().parent() {
                if !parent.is_complete() {
                    return Err(DatastoreError::BadValue(format!(
                        "parent of {} is incomplete",
                        entity.key()
                    )));
                }
            }
        }

        let mut map = self.write_map()?;
        let mut keys = Vec::with_capacity(entities.len());
        for mut entity in entities {
            if !entity.key().is_complete() {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let completed = entity.key().completed(KeyId::Id(id));
                entity.set_key(completed);
            } else if let Some(id) = entity.key().id() {
                self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
            }
            keys.push(entity.key().clone());
            map.insert(entity.key().clone(), entity);
        }
        Ok(keys)
    }

    fn delete(&self, keys: &[Key]) -> DatastoreResult<()> {
        self.enter(Operation::Delete)?;
        let mut map = self.write_map()?;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    fn run<'a>(
        &'a self,
        query: &NativeQuery,
        options: RunOptions,
    ) -> DatastoreResult<Box<dyn ResultStream + 'a>> {
        self.enter(Operation::Run)?;
        self.run_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options);

        let matched = self.evaluate(query)?;
        let start = match query.start_cursor() {
            Some(cursor) => Self::decode_cursor(cursor)?,
            None => 0,
        };
        let end = match query.end_cursor() {
            Some(cursor) => Self::decode_cursor(cursor)?.min(matched.len()),
            None => matched.len(),
        };

        let begin = (start + options.offset).min(end);
        let stop = match options.limit {
            Some(limit) => (begin + limit).min(end),
            None => end,
        };

        let window: Vec<Entity> = matched[begin..stop].to_vec();
        Ok(Box::new(MemoryResults {
            items: window.into_iter(),
            position: begin,
            keys_only: query.is_keys_only(),
        }))
    }

    fn count(&self, query: &NativeQuery, limit: Option<usize>) -> DatastoreResult<usize> {
        self.enter(Operation::Count)?;
        let total = self.evaluate(query)?.len();
        Ok(limit.map_or(total, |l| total.min(l)))
    }

    fn allocate_ids(&self, _parent: Option<&Key>, _kind: &str, count: usize) -> DatastoreResult<Range<i64>> {
        self.enter(Operation::AllocateIds)?;
        let count = i64::try_from(count)
            .map_err(|_| DatastoreError::BadRequest(format!("cannot allocate {} ids", count)))?;
        let start = self.next_id.fetch_add(count, Ordering::Relaxed);
        Ok(start..start + count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{Direction, FilterOperator};

    fn seeded() -> MemoryDatastore {
        MemoryDatastore::with_entities(vec![
            Entity::new(Key::from_path("User", 1)).with("age", 20i64).with("name", "alice"),
            Entity::new(Key::from_path("User", 2)).with("age", 30i64).with("name", "bob"),
            Entity::new(Key::from_path("User", 3)).with("age", 40i64).with("name", "carol"),
            Entity::new(Key::from_path("Post", 1)).with("age", 99i64),
        ])
        .unwrap()
    }

    fn collect(stream: Box<dyn ResultStream + '_>) -> Vec<Entity> {
        stream.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_put_assigns_ids() {
        let store = MemoryDatastore::new();
        let keys = store
            .put(vec![Entity::new(Key::incomplete("User", None)).with("a", 1i64)])
            .unwrap();
        assert!(keys[0].is_complete());
        assert_eq!(store.get(&keys).unwrap()[0].as_ref().unwrap().get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_put_rejects_empty_list() {
        let store = MemoryDatastore::new();
        let entity = Entity::new(Key::from_path("User", 1)).with("tags", Value::List(vec![]));
        let err = store.put(vec![entity]).unwrap_err();
        assert_eq!(err.code(), "DS_BAD_VALUE");
        assert!(store.is_empty());
    }

    #[test]
    fn test_filter_and_order() {
        let store = seeded();
        let mut query = NativeQuery::new("User");
        query.add_filter("age", FilterOperator::Gte, Value::Int(30));
        query.set_order(&[("age".to_string(), Direction::Descending)]);

        let results = collect(store.run(&query, RunOptions::unbounded()).unwrap());
        let ids: Vec<_> = results.iter().map(|e| e.key().id().unwrap()).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_two_inequality_properties_rejected() {
        let store = seeded();
        let mut query = NativeQuery::new("User");
        query.add_filter("age", FilterOperator::Gt, Value::Int(1));
        query.add_filter("name", FilterOperator::Lt, Value::from("z"));
        assert!(matches!(
            store.run(&query, RunOptions::unbounded()),
            Err(DatastoreError::BadRequest(_))
        ));
    }

    #[test]
    fn test_unindexed_property_invisible() {
        let mut entity = Entity::new(Key::from_path("Doc", 1)).with("body", "text");
        entity.set_unindexed(["body"]);
        let store = MemoryDatastore::with_entities(vec![entity]).unwrap();

        let mut query = NativeQuery::new("Doc");
        query.add_filter("body", FilterOperator::Eq, Value::from("text"));
        assert_eq!(store.count(&query, None).unwrap(), 0);
    }

    #[test]
    fn test_window_and_cursor() {
        let store = seeded();
        let query = NativeQuery::new("User");

        let mut stream = store.run(&query, RunOptions::window(0, 2)).unwrap();
        assert_eq!(stream.next().unwrap().unwrap().key().id(), Some(1));
        assert_eq!(stream.next().unwrap().unwrap().key().id(), Some(2));
        assert!(stream.next().is_none());
        let cursor = stream.compiled_cursor().unwrap();

        let resumed = query.clone().with_cursors(Some(cursor), None);
        let rest = collect(store.run(&resumed, RunOptions::unbounded()).unwrap());
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key().id(), Some(3));
    }

    #[test]
    fn test_ancestor_scope() {
        let parent = Key::from_path("Author", 1);
        let store = MemoryDatastore::with_entities(vec![
            Entity::new(Key::with_parent(&parent, "Book", 1)).with("t", "a"),
            Entity::new(Key::with_parent(&Key::from_path("Author", 2), "Book", 2)).with("t", "b"),
        ])
        .unwrap();

        let mut query = NativeQuery::new("Book");
        query.set_ancestor(parent);
        assert_eq!(store.count(&query, None).unwrap(), 1);
    }

    #[test]
    fn test_keys_only() {
        let store = seeded();
        let query = NativeQuery::new("User").keys_only(true);
        let results = collect(store.run(&query, RunOptions::unbounded()).unwrap());
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|e| e.properties().is_empty()));
    }

    #[test]
    fn test_failure_injection_and_stats() {
        let store = seeded();
        store.fail(Operation::Get);
        assert!(store.get(&[Key::from_path("User", 1)]).is_err());
        assert_eq!(store.calls(Operation::Get), 1);

        store.heal();
        assert!(store.get(&[Key::from_path("User", 1)]).is_ok());
        assert_eq!(store.calls(Operation::Run), 0);
    }

    #[test]
    fn test_list_property_matches_any_element() {
        let store = MemoryDatastore::with_entities(vec![
            Entity::new(Key::from_path("Post", 1)).with("tags", vec!["rust", "db"]),
        ])
        .unwrap();
        let mut query = NativeQuery::new("Post");
        query.add_filter("tags", FilterOperator::Eq, Value::from("db"));
        assert_eq!(store.count(&query, None).unwrap(), 1);
    }
}
