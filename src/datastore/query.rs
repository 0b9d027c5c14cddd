//! Native conjunctive queries
//!
//! A `NativeQuery` is what the backing store can execute directly: a set of
//! AND-ed comparison filters, an order list, an optional ancestor scope and
//! optional cursors. There is no OR and no negation at this level.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::key::Key;
use super::store::Cursor;
use super::value::Value;

/// Reserved property name addressing the entity key
pub const KEY_PROPERTY: &str = "__key__";

/// Native comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
        }
    }

    /// Returns true for every operator except equality
    pub fn is_inequality(&self) -> bool {
        !matches!(self, FilterOperator::Eq)
    }

    /// Evaluates `lhs <op> rhs` under the native value order
    pub fn test(&self, lhs: &Value, rhs: &Value) -> bool {
        let ord = lhs.compare(rhs);
        match self {
            FilterOperator::Eq => ord.is_eq(),
            FilterOperator::Gt => ord.is_gt(),
            FilterOperator::Gte => ord.is_ge(),
            FilterOperator::Lt => ord.is_lt(),
            FilterOperator::Lte => ord.is_le(),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// Value slot of one filter entry.
///
/// Repeating a filter on the same `"<column> <op>"` accumulates values; all
/// of them must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Single(Value),
    Many(Vec<Value>),
}

impl FilterValue {
    pub fn values(&self) -> &[Value] {
        match self {
            FilterValue::Single(v) => std::slice::from_ref(v),
            FilterValue::Many(vs) => vs,
        }
    }

    fn push(&mut self, value: Value) {
        match self {
            FilterValue::Single(existing) => {
                let first = std::mem::replace(existing, Value::Null);
                *self = FilterValue::Many(vec![first, value]);
            }
            FilterValue::Many(vs) => vs.push(value),
        }
    }
}

/// One filter entry, keyed in the query by `"<column> <op>"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeFilter {
    pub column: String,
    pub op: FilterOperator,
    pub value: FilterValue,
}

/// A conjunctive query the backing store executes natively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    kind: String,
    filters: BTreeMap<String, NativeFilter>,
    orders: Vec<(String, Direction)>,
    ancestor: Option<Key>,
    keys_only: bool,
    start_cursor: Option<Cursor>,
    end_cursor: Option<Cursor>,
}

impl NativeQuery {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filters: BTreeMap::new(),
            orders: Vec::new(),
            ancestor: None,
            keys_only: false,
            start_cursor: None,
            end_cursor: None,
        }
    }

    pub fn keys_only(mut self, keys_only: bool) -> Self {
        self.keys_only = keys_only;
        self
    }

    pub fn with_cursors(mut self, start: Option<Cursor>, end: Option<Cursor>) -> Self {
        self.start_cursor = start;
        self.end_cursor = end;
        self
    }

    /// Adds `column op value`, accumulating onto an existing entry
    pub fn add_filter(&mut self, column: &str, op: FilterOperator, value: Value) {
        let slot = format!("{} {}", column, op.as_str());
        match self.filters.get_mut(&slot) {
            Some(existing) => existing.value.push(value),
            None => {
                self.filters.insert(
                    slot,
                    NativeFilter {
                        column: column.to_string(),
                        op,
                        value: FilterValue::Single(value),
                    },
                );
            }
        }
    }

    /// Fresh copy carrying the filters, order, scope and projection but no
    /// cursors. Used when a query is fanned out.
    pub fn fork(&self) -> NativeQuery {
        NativeQuery {
            start_cursor: None,
            end_cursor: None,
            ..self.clone()
        }
    }

    pub fn set_order(&mut self, orders: &[(String, Direction)]) {
        self.orders = orders.to_vec();
    }

    pub fn set_ancestor(&mut self, ancestor: Key) {
        self.ancestor = Some(ancestor);
    }

    pub fn set_keys_only(&mut self, keys_only: bool) {
        self.keys_only = keys_only;
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Filters keyed by `"<column> <op>"`
    pub fn filter_map(&self) -> &BTreeMap<String, NativeFilter> {
        &self.filters
    }

    /// Flattened `(column, op, value)` triples
    pub fn filters(&self) -> impl Iterator<Item = (&str, FilterOperator, &Value)> {
        self.filters.values().flat_map(|f| {
            f.value
                .values()
                .iter()
                .map(move |v| (f.column.as_str(), f.op, v))
        })
    }

    /// Returns the value slot for `"<column> <op>"`, if present
    pub fn filter(&self, slot: &str) -> Option<&FilterValue> {
        self.filters.get(slot).map(|f| &f.value)
    }

    pub fn orders(&self) -> &[(String, Direction)] {
        &self.orders
    }

    pub fn ancestor(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn start_cursor(&self) -> Option<&Cursor> {
        self.start_cursor.as_ref()
    }

    pub fn end_cursor(&self) -> Option<&Cursor> {
        self.end_cursor.as_ref()
    }
}

impl fmt::Display for NativeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let mut first = true;
        for (slot, filter) in &self.filters {
            write!(f, "{} {}: ", if first { " WHERE" } else { " AND" }, slot)?;
            match &filter.value {
                FilterValue::Single(v) => write!(f, "{:?}", v)?,
                FilterValue::Many(vs) => write!(f, "{:?}", vs)?,
            }
            first = false;
        }
        if let Some(ancestor) = &self.ancestor {
            write!(f, " ANCESTOR {}", ancestor)?;
        }
        for (i, (column, direction)) in self.orders.iter().enumerate() {
            write!(f, "{} {} {}", if i == 0 { " ORDER BY" } else { "," }, column, direction.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_slots() {
        let mut query = NativeQuery::new("Item");
        query.add_filter("a", FilterOperator::Eq, Value::Int(5));
        query.add_filter("b", FilterOperator::Gt, Value::Int(10));

        assert_eq!(query.filter("a ="), Some(&FilterValue::Single(Value::Int(5))));
        assert_eq!(query.filter("b >"), Some(&FilterValue::Single(Value::Int(10))));
        assert_eq!(query.filter_map().len(), 2);
    }

    #[test]
    fn test_repeated_filter_accumulates() {
        let mut query = NativeQuery::new("Item");
        query.add_filter("tags", FilterOperator::Eq, Value::from("x"));
        query.add_filter("tags", FilterOperator::Eq, Value::from("y"));
        query.add_filter("tags", FilterOperator::Eq, Value::from("z"));

        assert_eq!(
            query.filter("tags ="),
            Some(&FilterValue::Many(vec!["x".into(), "y".into(), "z".into()]))
        );
        assert_eq!(query.filters().count(), 3);
    }

    #[test]
    fn test_fork_drops_cursors() {
        let mut query = NativeQuery::new("Item")
            .with_cursors(Some(Cursor::new("start")), Some(Cursor::new("end")));
        query.add_filter("a", FilterOperator::Eq, Value::Int(1));

        let fork = query.fork();
        assert!(fork.start_cursor().is_none());
        assert!(fork.end_cursor().is_none());
        assert_eq!(fork.filter_map(), query.filter_map());
    }

    #[test]
    fn test_operator_semantics() {
        assert!(FilterOperator::Gt.test(&Value::Int(3), &Value::Null));
        assert!(FilterOperator::Lte.test(&Value::Int(3), &Value::Int(3)));
        assert!(!FilterOperator::Lt.test(&Value::Int(3), &Value::Int(3)));
        assert!(FilterOperator::Gt.is_inequality());
        assert!(!FilterOperator::Eq.is_inequality());
    }

    #[test]
    fn test_display() {
        let mut query = NativeQuery::new("Item");
        query.add_filter("a", FilterOperator::Eq, Value::Int(5));
        query.set_order(&[("b".to_string(), Direction::Ascending)]);
        assert_eq!(query.to_string(), "Item WHERE a =: Int(5) ORDER BY b ASC");
    }
}
