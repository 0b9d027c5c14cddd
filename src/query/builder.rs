//! Conjunctive query construction
//!
//! `DatastoreQuery` accumulates native sub-queries while the filter tree is
//! walked once. Construction rules:
//!
//! - All validation happens here, before any call into the store
//! - At most one field may carry inequality filters
//! - Disjunctions over one field fan out into sub-queries
//! - Primary-key equality and membership go to the key fast path
//! - Subtrees the store can't express are left to the `Matcher`

use std::fmt;

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::datastore::{Cursor, Datastore, Direction, FilterOperator, Key, NativeQuery, Value, KEY_PROPERTY};
use crate::engine::Engine;
use crate::observability::{log_event, Event};

use super::ast::{Connector, FieldDescriptor, FieldType, FilterNode, LookupKind, OrderSpec, QuerySpec};
use super::decoder::{decode, pk_parent, scope_of, to_key_value, DecodedPredicate};
use super::errors::{QueryError, QueryResult};
use super::evaluator::Matcher;
use super::expander::{check_combinations, combine_filters, keys_of, PrimaryKeySet};

/// A query under construction against one entity kind
pub struct DatastoreQuery<'e, D: Datastore> {
    pub(super) engine: &'e Engine<D>,
    pub(super) kind: String,
    pub(super) pks_only: bool,
    pub(super) queries: Vec<NativeQuery>,
    pub(super) ordering: Vec<(String, Direction)>,
    pub(super) ancestor: Option<Key>,
    pub(super) pk_set: PrimaryKeySet,
    pub(super) inequality_field: Option<String>,
    pub(super) has_negated_exact: bool,
    pub(super) emulated: bool,
    pub(super) filters: Vec<FilterNode>,
    pub(super) matcher: Matcher,
    pub(super) low_mark: usize,
    pub(super) high_mark: Option<usize>,
    pub(super) query_id: String,
}

impl<D: Datastore> fmt::Debug for DatastoreQuery<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreQuery")
            .field("kind", &self.kind)
            .field("sub_queries", &self.queries.len())
            .field("emulated", &self.emulated)
            .field("pks_only", &self.pks_only)
            .field("query_id", &self.query_id)
            .finish()
    }
}

impl<'e, D: Datastore> DatastoreQuery<'e, D> {
    /// Empty query over `kind`
    pub fn new(engine: &'e Engine<D>, kind: impl Into<String>, pks_only: bool) -> Self {
        let kind = kind.into();
        Self {
            engine,
            queries: vec![NativeQuery::new(kind.clone()).keys_only(pks_only)],
            kind,
            pks_only,
            ordering: Vec::new(),
            ancestor: None,
            pk_set: PrimaryKeySet::new(),
            inequality_field: None,
            has_negated_exact: false,
            emulated: false,
            filters: Vec::new(),
            matcher: Matcher::accept_all(),
            low_mark: 0,
            high_mark: None,
            query_id: Uuid::new_v4().to_string(),
        }
    }

    /// Compiles a complete query
    pub fn from_spec(engine: &'e Engine<D>, spec: &QuerySpec) -> QueryResult<Self> {
        let mut query = Self::new(engine, spec.kind.clone(), spec.is_pks_only());
        query.set_cursors(spec.start_cursor.clone(), spec.end_cursor.clone());
        if let Some(id) = &spec.query_id {
            query.query_id = id.clone();
        }
        if let Some(filter) = &spec.filter {
            query.add_filters(filter)?;
        }
        query.order_by(&spec.ordering);
        query.set_limits(spec.low_mark, spec.high_mark);

        engine.metrics().increment_queries_compiled();
        let sub_queries = query.queries.len().to_string();
        log_event(
            Event::QueryCompiled,
            &[
                ("kind", query.kind.as_str()),
                ("sub_queries", sub_queries.as_str()),
                ("emulated", if query.emulated { "true" } else { "false" }),
                ("fast_path", if query.pk_set.included().is_some() { "true" } else { "false" }),
            ],
        );
        Ok(query)
    }

    /// Positions the query between two cursors. Cursors are dropped if the
    /// query later fans out.
    pub fn set_cursors(&mut self, start: Option<Cursor>, end: Option<Cursor>) {
        if self.queries.len() == 1 {
            let query = std::mem::replace(&mut self.queries[0], NativeQuery::new(self.kind.clone()));
            self.queries[0] = query.with_cursors(start, end);
        }
    }

    /// Walks a filter tree, adding every conjunctive leaf as a native filter.
    ///
    /// Negation is carried down; a negated OR becomes an AND of negated
    /// children. Subtrees that stay disjunctive are evaluated in memory.
    pub fn add_filters(&mut self, tree: &FilterNode) -> QueryResult<()> {
        let tree = tree.clone().normalize();
        // primary-key values below a hierarchical scope need it up front
        if let Some(scope) = scope_of(&tree) {
            self.set_ancestor(scope.clone());
        }
        self.walk(&tree, false)?;
        self.filters.push(tree);

        let combined = match self.filters.as_slice() {
            [single] => single.clone(),
            many => FilterNode::and(many.to_vec()),
        };
        self.matcher = Matcher::from_tree(&combined, &self.kind)?;
        Ok(())
    }

    fn walk(&mut self, node: &FilterNode, negated: bool) -> QueryResult<()> {
        if let FilterNode::Connector {
            connector,
            negated: node_negated,
            children,
        } = node
        {
            let negated = negated != *node_negated;
            let conjunctive = match (connector, negated) {
                (Connector::And, false) | (Connector::Or, true) => true,
                _ => children.len() <= 1,
            };
            if !conjunctive {
                self.mark_emulated(if negated { "negated and" } else { "or" });
                return Ok(());
            }
            for child in children {
                self.walk(child, negated)?;
            }
            return Ok(());
        }

        match decode(node, negated)? {
            Some(DecodedPredicate::Ancestor(_)) if negated => {
                self.mark_emulated("negated ancestor");
                Ok(())
            }
            Some(DecodedPredicate::Ancestor(key)) => {
                self.set_ancestor(key.clone());
                Ok(())
            }
            Some(DecodedPredicate::Filter {
                field,
                lookup,
                negated,
                value,
            }) => self.add_filter(field, lookup, negated, value),
            None => Ok(()),
        }
    }

    fn mark_emulated(&mut self, reason: &str) {
        self.emulated = true;
        log_event(Event::EmulationRequired, &[("kind", self.kind.as_str()), ("reason", reason)]);
    }

    /// Restricts results to descendants of `key`. Setting a scope again
    /// replaces the previous one.
    pub fn set_ancestor(&mut self, key: Key) {
        if let Some(previous) = &self.ancestor {
            if *previous != key {
                log_event(
                    Event::AncestorReplaced,
                    &[("previous", previous.to_string().as_str()), ("ancestor", key.to_string().as_str())],
                );
            }
        }
        self.ancestor = Some(key);
    }

    /// Adds one decoded predicate
    pub fn add_filter(
        &mut self,
        field: &FieldDescriptor,
        lookup: LookupKind,
        negated: bool,
        value: &Value,
    ) -> QueryResult<()> {
        if lookup == LookupKind::Ancestor {
            let key = value.as_key().ok_or_else(|| {
                QueryError::invalid_value(format!("ancestor scope needs a key, got {}", value.type_name()))
            })?;
            self.set_ancestor(key.clone());
            return Ok(());
        }

        if !lookup.is_native() {
            return Err(QueryError::UnsupportedLookup(lookup.to_string()));
        }

        // The store never holds empty lists, so nothing can match one
        if value.is_empty_list() && !negated {
            self.pk_set.short_circuit();
            return Ok(());
        }

        if field.primary_key && matches!(lookup, LookupKind::Exact | LookupKind::In) {
            let parent = pk_parent(field, self.ancestor.as_ref());
            let keys = keys_of(&to_key_value(&self.kind, parent, value)?);
            let count = keys.len().to_string();
            self.pk_set.apply(keys, negated)?;
            log_event(
                Event::PrimaryKeyFastPath,
                &[
                    ("kind", self.kind.as_str()),
                    ("keys", count.as_str()),
                    ("negated", if negated { "true" } else { "false" }),
                ],
            );
            return Ok(());
        }

        self.ensure_indexed(field)?;
        let column = Self::column_of(field);
        let value = if field.primary_key {
            to_key_value(&self.kind, pk_parent(field, self.ancestor.as_ref()), value)?
        } else {
            value.clone()
        };

        match lookup {
            LookupKind::IsNull => {
                let flag = value
                    .as_bool()
                    .ok_or_else(|| QueryError::invalid_value("isnull needs a boolean"))?;
                // "not null" is approximated as "greater than null"
                if flag != negated {
                    self.add_native(&column, FilterOperator::Eq, Value::Null);
                } else {
                    self.check_inequality(&column)?;
                    self.add_native(&column, FilterOperator::Gt, Value::Null);
                }
            }
            LookupKind::Exact if negated => {
                if self.has_negated_exact {
                    return Err(QueryError::MultipleNegatedExactFilter);
                }
                self.check_inequality(&column)?;
                self.has_negated_exact = true;
                self.expand(&column, &[(FilterOperator::Lt, value.clone()), (FilterOperator::Gt, value)]);
            }
            _ if negated => {
                let op = match lookup {
                    LookupKind::Gt => FilterOperator::Lte,
                    LookupKind::Gte => FilterOperator::Lt,
                    LookupKind::Lt => FilterOperator::Gte,
                    LookupKind::Lte => FilterOperator::Gt,
                    other => return Err(QueryError::NonNegatableLookup(other)),
                };
                self.check_inequality(&column)?;
                self.add_native(&column, op, value);
            }
            LookupKind::In => {
                let values = match value {
                    Value::List(items) => items,
                    single => vec![single],
                };
                check_combinations(
                    self.queries.len(),
                    values.len(),
                    self.engine.config().max_in_combinations,
                )?;
                let alternatives: Vec<(FilterOperator, Value)> =
                    values.into_iter().map(|v| (FilterOperator::Eq, v)).collect();
                self.expand(&column, &alternatives);
            }
            LookupKind::StartsWith => {
                let prefix = value
                    .as_text()
                    .ok_or_else(|| QueryError::invalid_value("startswith needs text"))?;
                self.check_inequality(&column)?;
                self.add_native(&column, FilterOperator::Gte, Value::Text(prefix.to_string()));
                if let Some(upper) = prefix_successor(prefix) {
                    self.add_native(&column, FilterOperator::Lt, Value::Text(upper));
                }
            }
            LookupKind::Range => {
                let (lower, upper) = Self::pair(&value, "range")?;
                self.check_inequality(&column)?;
                self.add_native(&column, FilterOperator::Gte, lower);
                self.add_native(&column, FilterOperator::Lte, upper);
            }
            LookupKind::Year => {
                let (lower, upper) = Self::year_bounds(field.field_type, &value)?;
                self.check_inequality(&column)?;
                self.add_native(&column, FilterOperator::Gte, lower);
                self.add_native(&column, FilterOperator::Lt, upper);
            }
            LookupKind::Exact | LookupKind::Gt | LookupKind::Gte | LookupKind::Lt | LookupKind::Lte => {
                let op = match lookup {
                    LookupKind::Gt => FilterOperator::Gt,
                    LookupKind::Gte => FilterOperator::Gte,
                    LookupKind::Lt => FilterOperator::Lt,
                    LookupKind::Lte => FilterOperator::Lte,
                    _ => FilterOperator::Eq,
                };
                if op.is_inequality() {
                    self.check_inequality(&column)?;
                }
                self.add_native(&column, op, value);
            }
            other => return Err(QueryError::UnsupportedLookup(other.to_string())),
        }
        Ok(())
    }

    fn column_of(field: &FieldDescriptor) -> String {
        if field.primary_key {
            KEY_PROPERTY.to_string()
        } else {
            field.column.clone()
        }
    }

    fn ensure_indexed(&self, field: &FieldDescriptor) -> QueryResult<()> {
        if field.primary_key {
            return Ok(());
        }
        if !field.field_type.is_indexable() || self.engine.config().indexes.is_unindexed(&self.kind, &field.column) {
            return Err(QueryError::UnindexedFieldFilter {
                kind: self.kind.clone(),
                column: field.column.clone(),
            });
        }
        Ok(())
    }

    fn check_inequality(&mut self, column: &str) -> QueryResult<()> {
        match &self.inequality_field {
            Some(existing) if existing != column => Err(QueryError::MultipleInequalityFields {
                first: existing.clone(),
                second: column.to_string(),
            }),
            _ => {
                self.inequality_field = Some(column.to_string());
                Ok(())
            }
        }
    }

    fn add_native(&mut self, column: &str, op: FilterOperator, value: Value) {
        for query in &mut self.queries {
            query.add_filter(column, op, value.clone());
        }
    }

    fn expand(&mut self, column: &str, alternatives: &[(FilterOperator, Value)]) {
        combine_filters(&mut self.queries, column, alternatives);
        let count = self.queries.len().to_string();
        log_event(Event::SubQueriesExpanded, &[("column", column), ("sub_queries", count.as_str())]);
    }

    fn pair(value: &Value, lookup: &str) -> QueryResult<(Value, Value)> {
        match value.as_list() {
            Some([lower, upper]) => Ok((lower.clone(), upper.clone())),
            _ => Err(QueryError::invalid_value(format!("{} needs a [lower, upper] pair", lookup))),
        }
    }

    /// `[Jan 1 of year, Jan 1 of year + 1)`, typed after the field
    fn year_bounds(field_type: FieldType, value: &Value) -> QueryResult<(Value, Value)> {
        if value.as_list().is_some() {
            return Self::pair(value, "year");
        }
        let year = value
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| QueryError::invalid_value("year needs an integer"))?;
        let first_day = |y: i32| {
            NaiveDate::from_ymd_opt(y, 1, 1)
                .ok_or_else(|| QueryError::invalid_value(format!("year {} out of range", y)))
        };
        let (lower, upper) = (first_day(year)?, first_day(year + 1)?);

        match field_type {
            FieldType::Date => Ok((Value::Date(lower), Value::Date(upper))),
            _ => {
                let midnight = |d: NaiveDate| {
                    d.and_hms_opt(0, 0, 0)
                        .map(|naive| Value::Timestamp(Utc.from_utc_datetime(&naive)))
                        .ok_or_else(|| QueryError::invalid_value("invalid year bound"))
                };
                Ok((midnight(lower)?, midnight(upper)?))
            }
        }
    }

    /// Appends orderings; the primary key orders by `__key__`
    pub fn order_by(&mut self, ordering: &[OrderSpec]) {
        for order in ordering {
            let direction = if order.ascending {
                Direction::Ascending
            } else {
                Direction::Descending
            };
            self.ordering.push((Self::column_of(&order.field), direction));
        }
    }

    /// Offset and `low + limit` used by `delete`
    pub fn set_limits(&mut self, low: usize, high: Option<usize>) {
        self.low_mark = low;
        self.high_mark = high;
    }

    /// Finalized sub-queries with ordering and ancestor scope attached
    pub fn build_queries(&self) -> Vec<NativeQuery> {
        // In-memory evaluation and merging by property need full entities
        let keys_only = self.pks_only
            && !self.emulated
            && (self.queries.len() == 1 || self.ordering.iter().all(|(column, _)| column == KEY_PROPERTY));
        self.queries
            .iter()
            .map(|query| {
                let mut query = query.clone();
                query.set_order(&self.ordering);
                if let Some(ancestor) = &self.ancestor {
                    query.set_ancestor(ancestor.clone());
                }
                query.set_keys_only(keys_only);
                query
            })
            .collect()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn sub_query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn ordering(&self) -> &[(String, Direction)] {
        &self.ordering
    }

    pub fn ancestor(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn primary_keys(&self) -> &PrimaryKeySet {
        &self.pk_set
    }

    pub fn inequality_field(&self) -> Option<&str> {
        self.inequality_field.as_deref()
    }

    /// Returns true when part of the filter is evaluated in memory
    pub fn is_emulated(&self) -> bool {
        self.emulated
    }

    pub fn is_pks_only(&self) -> bool {
        self.pks_only
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn limits(&self) -> (usize, Option<usize>) {
        (self.low_mark, self.high_mark)
    }
}

/// Smallest string greater than every string starting with `prefix`.
///
/// The last character is bumped to the next scalar value; a trailing
/// `char::MAX` is dropped and the carry moves left. `None` when no such
/// string exists (empty prefix or all `char::MAX`).
fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = match last {
            char::MAX => continue,
            '\u{d7ff}' => '\u{e000}',
            c => match char::from_u32(c as u32 + 1) {
                Some(next) => next,
                None => continue,
            },
        };
        chars.push(next);
        return Some(chars.into_iter().collect());
    }
    None
}
