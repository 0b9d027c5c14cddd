//! Disjunctive expansion and the primary-key fast path
//!
//! The native store has no OR. A disjunction over one field becomes a
//! cartesian product: every held sub-query is forked once per alternative.
//! Primary-key equality and membership skip native filtering entirely and
//! are answered by a batch get.

use crate::datastore::{FilterOperator, Key, NativeQuery, Value};

use super::errors::{QueryError, QueryResult};

/// Fails when expanding `current` sub-queries by `alternatives` would exceed
/// `max` combinations
pub fn check_combinations(current: usize, alternatives: usize, max: usize) -> QueryResult<()> {
    let requested = current.saturating_mul(alternatives);
    if requested > max {
        return Err(QueryError::TooManyInCombinations { requested, max });
    }
    Ok(())
}

/// Replaces `queries` with one fork per (sub-query, alternative) pair
pub fn combine_filters(queries: &mut Vec<NativeQuery>, column: &str, alternatives: &[(FilterOperator, Value)]) {
    let mut combined = Vec::with_capacity(queries.len() * alternatives.len());
    for query in queries.iter() {
        for (op, value) in alternatives {
            let mut fork = query.fork();
            fork.add_filter(column, *op, value.clone());
            combined.push(fork);
        }
    }
    *queries = combined;
}

/// Primary keys a query is restricted to or must skip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryKeySet {
    included: Option<Vec<Key>>,
    excluded: Vec<Key>,
    applied: bool,
}

impl PrimaryKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces an empty result. Later primary-key filters become no-ops.
    pub fn short_circuit(&mut self) {
        self.included = Some(Vec::new());
    }

    /// Returns true when the query can't return anything
    pub fn is_short_circuited(&self) -> bool {
        matches!(&self.included, Some(keys) if keys.is_empty())
    }

    /// Applies a primary-key exact/in filter.
    ///
    /// Negated filters extend the exclusion list; a second non-negated
    /// filter is rejected.
    pub fn apply(&mut self, keys: Vec<Key>, negated: bool) -> QueryResult<()> {
        if negated {
            for key in keys {
                if !self.excluded.contains(&key) {
                    self.excluded.push(key);
                }
            }
            return Ok(());
        }
        if self.applied {
            return Err(QueryError::MultiplePrimaryKeyFilter);
        }
        self.applied = true;
        if self.is_short_circuited() {
            return Ok(());
        }

        let mut unique: Vec<Key> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        self.included = Some(unique);
        Ok(())
    }

    pub fn included(&self) -> Option<&[Key]> {
        self.included.as_deref()
    }

    pub fn excluded(&self) -> &[Key] {
        &self.excluded
    }

    pub fn is_excluded(&self, key: &Key) -> bool {
        self.excluded.contains(key)
    }
}

/// Non-null keys in a primary-key lookup value
pub fn keys_of(value: &Value) -> Vec<Key> {
    let items = match value {
        Value::List(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    items.iter().filter_map(|v| v.as_key().cloned()).collect()
}
