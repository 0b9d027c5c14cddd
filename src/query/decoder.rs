//! Predicate decoding
//!
//! Turns one filter-tree leaf into either a field predicate or a
//! hierarchical-scope directive. Scope is recognized in three shapes:
//!
//! - `FilterNode::Scope(key)`
//! - a leaf whose lookup is `ancestor`
//! - a leaf on the reserved `__ancestor` column

use crate::datastore::{Key, Value};

use super::ast::{Connector, FieldDescriptor, FilterNode, LookupKind};
use super::errors::{QueryError, QueryResult};

/// Reserved column marking a hierarchical-scope leaf
pub const ANCESTOR_COLUMN: &str = "__ancestor";

/// A decoded leaf
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPredicate<'a> {
    Filter {
        field: &'a FieldDescriptor,
        lookup: LookupKind,
        negated: bool,
        value: &'a Value,
    },
    Ancestor(&'a Key),
}

/// Decodes a leaf. Connector nodes yield `None`.
pub fn decode(node: &FilterNode, negated: bool) -> QueryResult<Option<DecodedPredicate<'_>>> {
    match node {
        FilterNode::Connector { .. } => Ok(None),
        FilterNode::Scope(key) => Ok(Some(DecodedPredicate::Ancestor(key))),
        FilterNode::Leaf {
            field,
            lookup,
            value,
        } => {
            if *lookup == LookupKind::Ancestor || field.column == ANCESTOR_COLUMN {
                let key = value.as_key().ok_or_else(|| {
                    QueryError::invalid_value(format!(
                        "ancestor scope needs a key, got {}",
                        value.type_name()
                    ))
                })?;
                return Ok(Some(DecodedPredicate::Ancestor(key)));
            }
            Ok(Some(DecodedPredicate::Filter {
                field,
                lookup: *lookup,
                negated,
                value,
            }))
        }
    }
}

/// Ancestor scope a whole tree is restricted to: the last scope leaf
/// reached through non-negated AND connectors only.
pub fn scope_of(tree: &FilterNode) -> Option<&Key> {
    match tree {
        FilterNode::Connector {
            connector: Connector::And,
            negated: false,
            children,
        } => children.iter().filter_map(scope_of).last(),
        FilterNode::Connector { .. } => None,
        leaf => match decode(leaf, false) {
            Ok(Some(DecodedPredicate::Ancestor(key))) => Some(key),
            _ => None,
        },
    }
}

/// Parent for primary-key values of `field`: the scope, when the field is a
/// hierarchical key whose parent kind is the scope's kind.
pub fn pk_parent<'k>(field: &FieldDescriptor, scope: Option<&'k Key>) -> Option<&'k Key> {
    scope.filter(|key| field.ancestor_kind.as_deref() == Some(key.kind()))
}

/// Converts a primary-key lookup value to a key of `kind`.
///
/// Integer ids and string names are wrapped, below `parent` when one is
/// given; keys pass through; lists are converted element-wise; null stays
/// null.
pub fn to_key_value(kind: &str, parent: Option<&Key>, value: &Value) -> QueryResult<Value> {
    match value {
        Value::Null | Value::Key(_) => Ok(value.clone()),
        Value::Int(id) => Ok(Value::Key(match parent {
            Some(parent) => Key::with_parent(parent, kind, *id),
            None => Key::from_path(kind, *id),
        })),
        Value::Text(name) => Ok(Value::Key(match parent {
            Some(parent) => Key::with_parent(parent, kind, name.as_str()),
            None => Key::from_path(kind, name.as_str()),
        })),
        Value::List(items) => items
            .iter()
            .map(|v| to_key_value(kind, parent, v))
            .collect::<QueryResult<Vec<_>>>()
            .map(Value::List),
        other => Err(QueryError::invalid_value(format!(
            "{} can't be used as a primary key",
            other.type_name()
        ))),
    }
}
