//! In-memory predicate evaluation
//!
//! A `Matcher` is the filter tree rebuilt for evaluation against a
//! materialized entity. It is the only correctness guarantee for
//! key-fetched records and for update-time re-validation, and it carries
//! the emulated part of a query that native filters can't express.
//!
//! Null handling for a missing or null record value:
//! - temporal comparison value: only `lt`/`lte` match
//! - text-matching lookups never match
//! - otherwise the lookup decides

use crate::datastore::{Entity, Key, Value};

use super::ast::{Connector, FilterNode, LookupKind};
use super::decoder::{decode, pk_parent, scope_of, to_key_value, DecodedPredicate};
use super::errors::{QueryError, QueryResult};
use super::lookups::emulated;

#[derive(Debug, Clone)]
enum MatchNode {
    Group {
        connector: Connector,
        negated: bool,
        children: Vec<MatchNode>,
    },
    Leaf {
        column: String,
        primary_key: bool,
        lookup: LookupKind,
        value: Value,
    },
    Scope(Key),
}

/// Recursive in-memory predicate
#[derive(Debug, Clone)]
pub struct Matcher {
    root: MatchNode,
}

impl Matcher {
    /// Builds a matcher for entities of `kind`.
    ///
    /// Primary-key comparison values are converted to keys of `kind`,
    /// below the tree's ancestor scope for hierarchical keys.
    pub fn from_tree(tree: &FilterNode, kind: &str) -> QueryResult<Self> {
        let normalized = tree.clone().normalize();
        let scope = scope_of(&normalized);
        Ok(Self {
            root: Self::build(&normalized, kind, scope)?,
        })
    }

    /// Matcher accepting every entity
    pub fn accept_all() -> Self {
        Self {
            root: MatchNode::Group {
                connector: Connector::And,
                negated: false,
                children: Vec::new(),
            },
        }
    }

    fn build(node: &FilterNode, kind: &str, scope: Option<&Key>) -> QueryResult<MatchNode> {
        if let FilterNode::Connector {
            connector,
            negated,
            children,
        } = node
        {
            let children = children
                .iter()
                .map(|child| Self::build(child, kind, scope))
                .collect::<QueryResult<Vec<_>>>()?;
            return Ok(MatchNode::Group {
                connector: *connector,
                negated: *negated,
                children,
            });
        }

        match decode(node, false)? {
            Some(DecodedPredicate::Ancestor(key)) => Ok(MatchNode::Scope(key.clone())),
            Some(DecodedPredicate::Filter {
                field,
                lookup,
                value,
                ..
            }) => {
                if emulated(lookup).is_none() {
                    return Err(QueryError::UnsupportedLookup(lookup.to_string()));
                }
                let value = if field.primary_key {
                    to_key_value(kind, pk_parent(field, scope), value)?
                } else {
                    value.clone()
                };
                Ok(MatchNode::Leaf {
                    column: field.column.clone(),
                    primary_key: field.primary_key,
                    lookup,
                    value,
                })
            }
            None => Ok(MatchNode::Group {
                connector: Connector::And,
                negated: false,
                children: Vec::new(),
            }),
        }
    }

    /// Evaluates the full tree against `entity`
    pub fn matches(&self, entity: &Entity) -> bool {
        Self::eval(&self.root, entity)
    }

    fn eval(node: &MatchNode, entity: &Entity) -> bool {
        match node {
            MatchNode::Group {
                connector,
                negated,
                children,
            } => {
                let result = match connector {
                    Connector::And => children.iter().all(|c| Self::eval(c, entity)),
                    Connector::Or => children.iter().any(|c| Self::eval(c, entity)),
                };
                result != *negated
            }
            MatchNode::Scope(scope) => entity.key().has_ancestor(scope),
            MatchNode::Leaf {
                column,
                primary_key,
                lookup,
                value,
            } => {
                let key_value;
                let actual = if *primary_key {
                    key_value = Value::Key(entity.key().clone());
                    &key_value
                } else {
                    entity.get(column).unwrap_or(&Value::Null)
                };

                if actual.is_null() {
                    if value.is_temporal() {
                        return matches!(lookup, LookupKind::Lt | LookupKind::Lte);
                    }
                    if lookup.is_text_match() {
                        return false;
                    }
                }
                emulated(*lookup).map_or(false, |compare| compare(actual, value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{FieldDescriptor, FieldType};
    use chrono::NaiveDate;

    fn name() -> FieldDescriptor {
        FieldDescriptor::new("name", FieldType::Text)
    }

    fn age() -> FieldDescriptor {
        FieldDescriptor::new("age", FieldType::Integer)
    }

    fn person(id: i64, name: &str, age: i64) -> Entity {
        Entity::new(Key::from_path("Person", id))
            .with("name", name)
            .with("age", age)
    }

    #[test]
    fn test_and_or_negation() {
        let tree = FilterNode::and(vec![
            FilterNode::leaf(&age(), LookupKind::Gte, 18i64),
            FilterNode::not(FilterNode::or(vec![
                FilterNode::leaf(&name(), LookupKind::Exact, "bob"),
                FilterNode::leaf(&name(), LookupKind::StartsWith, "z"),
            ])),
        ]);
        let matcher = Matcher::from_tree(&tree, "Person").unwrap();

        assert!(matcher.matches(&person(1, "alice", 30)));
        assert!(!matcher.matches(&person(2, "bob", 30)));
        assert!(!matcher.matches(&person(3, "zed", 30)));
        assert!(!matcher.matches(&person(4, "carol", 12)));
    }

    #[test]
    fn test_deep_single_child_nesting_is_transparent() {
        let leaf = FilterNode::leaf(&age(), LookupKind::Exact, 5i64);
        let tree = FilterNode::and(vec![FilterNode::or(vec![FilterNode::and(vec![leaf])])]);
        let matcher = Matcher::from_tree(&tree, "Person").unwrap();
        assert!(matcher.matches(&person(1, "a", 5)));
        assert!(!matcher.matches(&person(2, "a", 6)));
    }

    #[test]
    fn test_negated_exact_is_lt_or_gt() {
        let tree = FilterNode::not(FilterNode::leaf(&age(), LookupKind::Exact, 10i64));
        let matcher = Matcher::from_tree(&tree, "Person").unwrap();
        for value in [5i64, 10, 15] {
            assert_eq!(matcher.matches(&person(1, "a", value)), value != 10);
        }
    }

    #[test]
    fn test_null_rules() {
        let born = FieldDescriptor::new("born", FieldType::Date);
        let day = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let missing = Entity::new(Key::from_path("Person", 1i64));

        let lt = Matcher::from_tree(&FilterNode::leaf(&born, LookupKind::Lt, day), "Person").unwrap();
        let gt = Matcher::from_tree(&FilterNode::leaf(&born, LookupKind::Gt, day), "Person").unwrap();
        let exact = Matcher::from_tree(&FilterNode::leaf(&born, LookupKind::Exact, day), "Person").unwrap();
        assert!(lt.matches(&missing));
        assert!(!gt.matches(&missing));
        assert!(!exact.matches(&missing));

        let contains = Matcher::from_tree(&FilterNode::leaf(&name(), LookupKind::Contains, ""), "Person").unwrap();
        assert!(!contains.matches(&missing));

        let isnull = Matcher::from_tree(&FilterNode::leaf(&name(), LookupKind::IsNull, true), "Person").unwrap();
        assert!(isnull.matches(&missing));
    }

    #[test]
    fn test_primary_key_values_become_keys() {
        let pk = FieldDescriptor::primary_key("id");
        let tree = FilterNode::leaf(&pk, LookupKind::In, vec![1i64, 3]);
        let matcher = Matcher::from_tree(&tree, "Person").unwrap();
        assert!(matcher.matches(&person(1, "a", 1)));
        assert!(!matcher.matches(&person(2, "a", 1)));
        assert!(matcher.matches(&person(3, "a", 1)));
    }

    #[test]
    fn test_scope() {
        let parent = Key::from_path("Family", 1i64);
        let tree = FilterNode::and(vec![
            FilterNode::Scope(parent.clone()),
            FilterNode::leaf(&age(), LookupKind::Gt, 1i64),
        ]);
        let matcher = Matcher::from_tree(&tree, "Person").unwrap();

        let inside = Entity::new(Key::with_parent(&parent, "Person", 5i64)).with("age", 4i64);
        let outside = Entity::new(Key::from_path("Person", 5i64)).with("age", 4i64);
        assert!(matcher.matches(&inside));
        assert!(!matcher.matches(&outside));
    }

    #[test]
    fn test_accept_all() {
        assert!(Matcher::accept_all().matches(&person(1, "a", 1)));
    }
}
