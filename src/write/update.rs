//! Update path
//!
//! The store has no filtered update, so an update is a key query followed
//! by one read-validate-write cycle per candidate:
//!
//! 1. Run the governing query with a primary-key-only projection
//! 2. Per key, under the key's advisory lock:
//!    - re-fetch the record (skip if it vanished)
//!    - re-evaluate the full filter tree (skip if it no longer matches)
//!    - resolve each assignment against the fetched record
//!    - put the record back
//!
//! The count returned is the number of candidates examined, not the number
//! written. A storage failure mid-loop leaves earlier records updated.

use serde::{Deserialize, Serialize};

use crate::datastore::{Datastore, Entity, Value};
use crate::engine::Engine;
use crate::observability::{log_event, Event};
use crate::query::{DatastoreQuery, QueryError, QueryResult, QuerySpec};

use super::expression::Expression;

/// New value for a column, either fixed or computed per record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateValue {
    Literal(Value),
    Expression(Expression),
}

impl UpdateValue {
    /// Resolves against the record fetched inside the update loop
    pub fn resolve(&self, entity: &Entity) -> QueryResult<Value> {
        match self {
            UpdateValue::Literal(value) => Ok(value.clone()),
            UpdateValue::Expression(expr) => expr.evaluate(entity),
        }
    }
}

/// One `column = value` pair of an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: UpdateValue,
}

impl Assignment {
    pub fn literal(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: UpdateValue::Literal(value.into()),
        }
    }

    pub fn expression(column: impl Into<String>, expr: Expression) -> Self {
        Self {
            column: column.into(),
            value: UpdateValue::Expression(expr),
        }
    }
}

impl<D: Datastore> Engine<D> {
    /// Applies `assignments` to every record matching `spec`; returns the
    /// number of candidate keys examined
    pub fn update(&self, spec: &QuerySpec, assignments: &[Assignment]) -> QueryResult<usize> {
        if let Some(assignment) = assignments.iter().find(|a| a.column == spec.pk.column) {
            return Err(QueryError::invalid_value(format!(
                "can't assign to primary key column '{}'",
                assignment.column
            )));
        }

        let query = DatastoreQuery::from_spec(self, &spec.pks_only())?;
        let (low, high) = query.limits();
        let keys = query
            .fetch(low, high)?
            .map(|entity| entity.map(|e| e.key().clone()))
            .collect::<QueryResult<Vec<_>>>()?;

        let metrics = self.metrics();
        metrics.add_update_candidates(keys.len() as u64);

        for key in &keys {
            let _guard = self.locks().acquire(key);

            let fetched = self.storage("get", self.store().get(std::slice::from_ref(key)))?;
            let Some(mut entity) = fetched.into_iter().next().flatten() else {
                self.skip_update(key.to_string().as_str(), "missing");
                continue;
            };
            if !query.matcher().matches(&entity) {
                self.skip_update(key.to_string().as_str(), "no_longer_matches");
                continue;
            }

            let mut values = Vec::with_capacity(assignments.len());
            for assignment in assignments {
                values.push(assignment.value.resolve(&entity)?);
            }
            for (assignment, value) in assignments.iter().zip(values) {
                if value.is_empty_list() {
                    entity.remove(&assignment.column);
                } else {
                    entity.set(assignment.column.clone(), value);
                }
            }

            self.storage("put", self.store().put(vec![entity]))?;
            metrics.increment_updates_applied();
            log_event(Event::UpdateApplied, &[("key", key.to_string().as_str())]);
        }

        let candidates = keys.len().to_string();
        log_event(
            Event::UpdateCompleted,
            &[("kind", spec.kind.as_str()), ("candidates", candidates.as_str())],
        );
        Ok(keys.len())
    }

    fn skip_update(&self, key: &str, reason: &str) {
        self.metrics().increment_updates_skipped();
        log_event(Event::UpdateSkipped, &[("key", key), ("reason", reason)]);
    }
}
