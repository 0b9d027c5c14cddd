//! Stored entities

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::key::Key;
use super::value::Value;

/// A record in the backing store: a key plus named properties.
///
/// Properties listed in `unindexed` are stored but invisible to native
/// filters and sort orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    key: Key,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    #[serde(default)]
    unindexed: BTreeSet<String>,
}

impl Entity {
    /// Creates an entity with no properties
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
            unindexed: BTreeSet::new(),
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Declares the given properties as unindexed
    pub fn set_unindexed<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unindexed = names.into_iter().map(Into::into).collect();
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        !self.unindexed.contains(name)
    }

    pub fn unindexed(&self) -> &BTreeSet<String> {
        &self.unindexed
    }

    /// Copy carrying only the key, as returned by keys-only queries
    pub fn key_only(&self) -> Entity {
        Entity::new(self.key.clone())
    }
}
