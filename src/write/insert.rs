//! Insert path
//!
//! Builds one entity per row and writes them in a single batch put:
//! - explicit ids, names or keys become the entity key
//! - `AncestorKey` placeholders link to a parent, allocating an id when none
//!   was given, and get the stored id back-filled after the put
//! - unindexed columns come from the index configuration
//! - empty lists are dropped (the store rejects them)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::datastore::{Datastore, DatastoreError, Entity, Key, KeyId, Value};
use crate::engine::Engine;
use crate::observability::{log_event, Event};
use crate::query::{FieldDescriptor, QueryError, QueryResult};

/// Hierarchical primary key under construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorKey {
    pub ancestor: Key,
    /// Set by the caller, or back-filled after the insert
    pub key_id: Option<KeyId>,
}

impl AncestorKey {
    pub fn new(ancestor: Key) -> Self {
        Self {
            ancestor,
            key_id: None,
        }
    }

    pub fn with_id(ancestor: Key, key_id: impl Into<KeyId>) -> Self {
        Self {
            ancestor,
            key_id: Some(key_id.into()),
        }
    }
}

/// Primary-key value supplied for a new row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimaryKeyValue {
    Id(i64),
    Name(String),
    Key(Key),
    Ancestor(AncestorKey),
}

/// One row to insert, keyed by column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertRow {
    /// `None` lets the store assign an id
    #[serde(default)]
    pub key: Option<PrimaryKeyValue>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl InsertRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: PrimaryKeyValue) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Back-filled id of an `AncestorKey` placeholder
    pub fn ancestor_key_id(&self) -> Option<&KeyId> {
        match &self.key {
            Some(PrimaryKeyValue::Ancestor(placeholder)) => placeholder.key_id.as_ref(),
            _ => None,
        }
    }
}

impl<D: Datastore> Engine<D> {
    /// Inserts `rows` into `kind` with one batch put; returns the stored keys
    /// in row order
    pub fn insert(&self, kind: &str, pk: &FieldDescriptor, rows: &mut [InsertRow]) -> QueryResult<Vec<Key>> {
        let unindexed = self.config().indexes.unindexed_columns(kind);
        let mut entities = Vec::with_capacity(rows.len());
        let mut placeholders = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let key = match &row.key {
                None => Key::incomplete(kind, None),
                Some(PrimaryKeyValue::Id(id)) => Key::from_path(kind, *id),
                Some(PrimaryKeyValue::Name(name)) => Key::from_path(kind, name.as_str()),
                Some(PrimaryKeyValue::Key(key)) => key.clone(),
                Some(PrimaryKeyValue::Ancestor(placeholder)) => {
                    placeholders.push(index);
                    self.hierarchical_key(kind, pk, placeholder)?
                }
            };

            let mut entity = Entity::new(key);
            for (column, value) in &row.values {
                if *column == pk.column || value.is_empty_list() {
                    continue;
                }
                entity.set(column.clone(), value.clone());
            }
            entity.set_unindexed(unindexed.iter().cloned());
            entities.push(entity);
        }

        let keys = self.storage("put", self.store().put(entities))?;

        if !placeholders.is_empty() && keys.len() == rows.len() {
            for index in placeholders {
                if let Some(PrimaryKeyValue::Ancestor(placeholder)) = &mut rows[index].key {
                    placeholder.key_id = keys[index].id_or_name().cloned();
                }
            }
        }

        let count = keys.len().to_string();
        log_event(Event::InsertCommitted, &[("kind", kind), ("rows", count.as_str())]);
        Ok(keys)
    }

    /// Inserts a single row and returns its key
    pub fn insert_one(&self, kind: &str, pk: &FieldDescriptor, row: &mut InsertRow) -> QueryResult<Key> {
        self.insert(kind, pk, std::slice::from_mut(row))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                QueryError::Storage(DatastoreError::Internal(format!("put of one {} returned no key", kind)))
            })
    }

    fn hierarchical_key(&self, kind: &str, pk: &FieldDescriptor, placeholder: &AncestorKey) -> QueryResult<Key> {
        if let Some(expected) = &pk.ancestor_kind {
            if placeholder.ancestor.kind() != expected {
                return Err(QueryError::AmbiguousParentType {
                    expected: expected.clone(),
                    found: placeholder.ancestor.kind().to_string(),
                });
            }
        }

        match &placeholder.key_id {
            Some(id) => Ok(Key::with_parent(&placeholder.ancestor, kind, id.clone())),
            None => {
                let ids = self.storage(
                    "allocate_ids",
                    self.store().allocate_ids(Some(&placeholder.ancestor), kind, 1),
                )?;
                Ok(Key::with_parent(&placeholder.ancestor, kind, ids.start))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, IndexConfig};
    use crate::datastore::{MemoryDatastore, Operation};

    fn pk() -> FieldDescriptor {
        FieldDescriptor::primary_key("id")
    }

    #[test]
    fn test_insert_assigns_keys() {
        let engine = Engine::new(MemoryDatastore::new());
        let mut rows = vec![
            InsertRow::new().with("title", "a"),
            InsertRow::new().with_key(PrimaryKeyValue::Id(10)).with("title", "b"),
            InsertRow::new().with_key(PrimaryKeyValue::Name("c".into())).with("title", "c"),
        ];
        let keys = engine.insert("Post", &pk(), &mut rows).unwrap();

        assert_eq!(keys.len(), 3);
        assert!(keys[0].is_complete());
        assert_eq!(keys[1], Key::from_path("Post", 10i64));
        assert_eq!(keys[2], Key::from_path("Post", "c"));
        assert_eq!(engine.store().len(), 3);
        assert_eq!(engine.store().calls(Operation::Put), 1);
    }

    #[test]
    fn test_empty_lists_and_pk_column_skipped() {
        let engine = Engine::new(MemoryDatastore::new());
        let mut rows = vec![InsertRow::new()
            .with_key(PrimaryKeyValue::Id(1))
            .with("id", 1i64)
            .with("tags", Value::List(vec![]))
            .with("title", "x")];
        let keys = engine.insert("Post", &pk(), &mut rows).unwrap();

        let stored = engine.store().get(&keys).unwrap().remove(0).unwrap();
        assert!(stored.get("tags").is_none());
        assert!(stored.get("id").is_none());
        assert_eq!(stored.get("title"), Some(&Value::from("x")));
    }

    #[test]
    fn test_unindexed_columns_declared() {
        let config = EngineConfig::default().with_indexes(IndexConfig::new().with_unindexed("Post", ["body"]));
        let engine = Engine::with_config(MemoryDatastore::new(), config);
        let mut rows = vec![InsertRow::new().with("body", "long").with("title", "t")];
        let keys = engine.insert("Post", &pk(), &mut rows).unwrap();

        let stored = engine.store().get(&keys).unwrap().remove(0).unwrap();
        assert!(!stored.is_indexed("body"));
        assert!(stored.is_indexed("title"));
    }

    #[test]
    fn test_ancestor_placeholder_allocates_and_back_fills() {
        let engine = Engine::new(MemoryDatastore::new());
        let author = Key::from_path("Author", 7i64);
        let pk = FieldDescriptor::hierarchical_key("id", "Author");
        let mut rows = vec![
            InsertRow::new()
                .with_key(PrimaryKeyValue::Ancestor(AncestorKey::new(author.clone())))
                .with("title", "one"),
            InsertRow::new()
                .with_key(PrimaryKeyValue::Ancestor(AncestorKey::with_id(author.clone(), "two")))
                .with("title", "two"),
        ];
        let keys = engine.insert("Book", &pk, &mut rows).unwrap();

        assert_eq!(keys[0].parent(), Some(author.clone()));
        assert_eq!(rows[0].ancestor_key_id(), keys[0].id_or_name());
        assert!(rows[0].ancestor_key_id().is_some());
        assert_eq!(keys[1], Key::with_parent(&author, "Book", "two"));
        assert_eq!(engine.store().calls(Operation::AllocateIds), 1);
    }

    #[test]
    fn test_wrong_parent_kind_rejected() {
        let engine = Engine::new(MemoryDatastore::new());
        let pk = FieldDescriptor::hierarchical_key("id", "Author");
        let mut rows = vec![InsertRow::new().with_key(PrimaryKeyValue::Ancestor(AncestorKey::new(
            Key::from_path("Publisher", 1i64),
        )))];
        let err = engine.insert("Book", &pk, &mut rows).unwrap_err();
        assert_eq!(
            err,
            QueryError::AmbiguousParentType {
                expected: "Author".into(),
                found: "Publisher".into()
            }
        );
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_put_failure_is_storage_error() {
        let engine = Engine::new(MemoryDatastore::new());
        engine.store().fail(Operation::Put);
        let mut rows = vec![InsertRow::new().with("title", "x")];
        assert!(matches!(
            engine.insert("Post", &pk(), &mut rows),
            Err(QueryError::Storage(_))
        ));
    }

    #[test]
    fn test_insert_one_returns_key_and_back_fills() {
        let engine = Engine::new(MemoryDatastore::new());
        let mut plain = InsertRow::new().with_key(PrimaryKeyValue::Name("intro".into())).with("title", "a");
        assert_eq!(engine.insert_one("Post", &pk(), &mut plain).unwrap(), Key::from_path("Post", "intro"));

        let author = Key::from_path("Author", 3i64);
        let mut child = InsertRow::new().with_key(PrimaryKeyValue::Ancestor(AncestorKey::new(author.clone())));
        let key = engine
            .insert_one("Book", &FieldDescriptor::hierarchical_key("id", "Author"), &mut child)
            .unwrap();

        assert_eq!(key.parent(), Some(author));
        assert_eq!(child.ancestor_key_id(), key.id_or_name());
        assert_eq!(engine.store().calls(Operation::Put), 2);
    }
}
