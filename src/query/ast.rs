//! Filter tree structures
//!
//! The relational front end hands the engine field descriptors, a boolean
//! filter tree, an ordering list and limit/offset marks. These types are
//! that hand-off.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::datastore::{Cursor, Key, Value};

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    /// Text stored without an index; never filterable natively
    LongText,
    Boolean,
    DateTime,
    Date,
    Time,
    Key,
    List,
}

impl FieldType {
    pub fn is_indexable(&self) -> bool {
        !matches!(self, FieldType::LongText)
    }
}

/// Describes one model field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    #[serde(default)]
    pub primary_key: bool,
    pub field_type: FieldType,
    /// Kind a hierarchical primary key's parent must have
    #[serde(default)]
    pub ancestor_kind: Option<String>,
}

impl FieldDescriptor {
    /// Field stored under its own name
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            primary_key: false,
            field_type,
            ancestor_kind: None,
        }
    }

    /// Primary key field
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, FieldType::Key)
        }
    }

    /// Primary key whose parent must be of `ancestor_kind`
    pub fn hierarchical_key(name: impl Into<String>, ancestor_kind: impl Into<String>) -> Self {
        Self {
            ancestor_kind: Some(ancestor_kind.into()),
            ..Self::primary_key(name)
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

/// Lookup kinds understood by the engine.
///
/// The first group maps onto native comparisons; the text-matching group is
/// only ever evaluated in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    Exact,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    In,
    StartsWith,
    Range,
    Year,
    /// Hierarchical-scope marker
    Ancestor,

    IExact,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Contains,
    IContains,
    Regex,
    IRegex,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Exact => "exact",
            LookupKind::Gt => "gt",
            LookupKind::Gte => "gte",
            LookupKind::Lt => "lt",
            LookupKind::Lte => "lte",
            LookupKind::IsNull => "isnull",
            LookupKind::In => "in",
            LookupKind::StartsWith => "startswith",
            LookupKind::Range => "range",
            LookupKind::Year => "year",
            LookupKind::Ancestor => "ancestor",
            LookupKind::IExact => "iexact",
            LookupKind::IStartsWith => "istartswith",
            LookupKind::EndsWith => "endswith",
            LookupKind::IEndsWith => "iendswith",
            LookupKind::Contains => "contains",
            LookupKind::IContains => "icontains",
            LookupKind::Regex => "regex",
            LookupKind::IRegex => "iregex",
        }
    }

    /// Kinds the native builder can translate
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            LookupKind::Exact
                | LookupKind::Gt
                | LookupKind::Gte
                | LookupKind::Lt
                | LookupKind::Lte
                | LookupKind::IsNull
                | LookupKind::In
                | LookupKind::StartsWith
                | LookupKind::Range
                | LookupKind::Year
                | LookupKind::Ancestor
        )
    }

    /// Text-matching kinds; a null value never matches these
    pub fn is_text_match(&self) -> bool {
        matches!(
            self,
            LookupKind::StartsWith
                | LookupKind::Contains
                | LookupKind::EndsWith
                | LookupKind::IExact
                | LookupKind::IStartsWith
                | LookupKind::IContains
                | LookupKind::IEndsWith
        )
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LookupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [LookupKind; 19] = [
            LookupKind::Exact,
            LookupKind::Gt,
            LookupKind::Gte,
            LookupKind::Lt,
            LookupKind::Lte,
            LookupKind::IsNull,
            LookupKind::In,
            LookupKind::StartsWith,
            LookupKind::Range,
            LookupKind::Year,
            LookupKind::Ancestor,
            LookupKind::IExact,
            LookupKind::IStartsWith,
            LookupKind::EndsWith,
            LookupKind::IEndsWith,
            LookupKind::Contains,
            LookupKind::IContains,
            LookupKind::Regex,
            LookupKind::IRegex,
        ];
        ALL.iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| s.to_string())
    }
}

/// Boolean connector of a filter-tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connector {
    And,
    Or,
}

/// A filter tree.
///
/// Leaves compare one field; connectors combine children and may negate
/// the combination. `Scope` restricts results to descendants of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterNode {
    Leaf {
        field: FieldDescriptor,
        lookup: LookupKind,
        value: Value,
    },
    Connector {
        connector: Connector,
        #[serde(default)]
        negated: bool,
        children: Vec<FilterNode>,
    },
    Scope(Key),
}

impl FilterNode {
    pub fn leaf(field: &FieldDescriptor, lookup: LookupKind, value: impl Into<Value>) -> Self {
        FilterNode::Leaf {
            field: field.clone(),
            lookup,
            value: value.into(),
        }
    }

    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::Connector {
            connector: Connector::And,
            negated: false,
            children,
        }
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Connector {
            connector: Connector::Or,
            negated: false,
            children,
        }
    }

    /// Negates a node. Leaves are wrapped in a negated single-child AND.
    pub fn not(node: FilterNode) -> Self {
        match node {
            FilterNode::Connector {
                connector,
                negated,
                children,
            } => FilterNode::Connector {
                connector,
                negated: !negated,
                children,
            },
            other => FilterNode::Connector {
                connector: Connector::And,
                negated: true,
                children: vec![other],
            },
        }
    }

    /// Collapses single-child connectors and drops empty ones.
    ///
    /// A negated single-child connector keeps its negation: it either folds
    /// into a child connector or stays as a one-child wrapper around a leaf.
    pub fn normalize(self) -> FilterNode {
        match self {
            FilterNode::Connector {
                connector,
                negated,
                children,
            } => {
                let mut children: Vec<FilterNode> = children
                    .into_iter()
                    .map(FilterNode::normalize)
                    .filter(|c| !c.is_empty_connector())
                    .collect();

                if children.len() == 1 {
                    let only = children.remove(0);
                    return match only {
                        FilterNode::Connector {
                            connector: inner,
                            negated: inner_negated,
                            children: inner_children,
                        } => FilterNode::Connector {
                            connector: inner,
                            negated: negated ^ inner_negated,
                            children: inner_children,
                        },
                        leaf if !negated => leaf,
                        leaf => FilterNode::Connector {
                            connector,
                            negated,
                            children: vec![leaf],
                        },
                    };
                }

                FilterNode::Connector {
                    connector,
                    negated,
                    children,
                }
            }
            other => other,
        }
    }

    fn is_empty_connector(&self) -> bool {
        matches!(self, FilterNode::Connector { children, .. } if children.is_empty())
    }
}

/// One ordering entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: FieldDescriptor,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderSpec {
    pub fn asc(field: &FieldDescriptor) -> Self {
        Self {
            field: field.clone(),
            ascending: true,
        }
    }

    pub fn desc(field: &FieldDescriptor) -> Self {
        Self {
            field: field.clone(),
            ascending: false,
        }
    }
}

/// A complete query as handed over by the relational front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Entity kind (table)
    pub kind: String,
    /// Primary key field of the kind
    pub pk: FieldDescriptor,
    /// Projected fields; a projection of only the primary key runs keys-only
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub filter: Option<FilterNode>,
    #[serde(default)]
    pub ordering: Vec<OrderSpec>,
    #[serde(default)]
    pub low_mark: usize,
    #[serde(default)]
    pub high_mark: Option<usize>,
    #[serde(default)]
    pub start_cursor: Option<Cursor>,
    #[serde(default)]
    pub end_cursor: Option<Cursor>,
    /// Identifier under which continuation cursors are saved
    #[serde(default)]
    pub query_id: Option<String>,
}

impl QuerySpec {
    pub fn new(kind: impl Into<String>, pk: FieldDescriptor) -> Self {
        Self {
            kind: kind.into(),
            pk,
            fields: Vec::new(),
            filter: None,
            ordering: Vec::new(),
            low_mark: 0,
            high_mark: None,
            start_cursor: None,
            end_cursor: None,
            query_id: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.fields = fields;
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.ordering.push(order);
        self
    }

    /// Sets offset/limit; `high_mark = low + limit`
    pub fn with_limits(mut self, low: usize, high: Option<usize>) -> Self {
        self.low_mark = low;
        self.high_mark = high;
        self
    }

    pub fn with_cursors(mut self, start: Option<Cursor>, end: Option<Cursor>) -> Self {
        self.start_cursor = start;
        self.end_cursor = end;
        self
    }

    pub fn with_query_id(mut self, id: impl Into<String>) -> Self {
        self.query_id = Some(id.into());
        self
    }

    /// Returns true when only the primary key is projected
    pub fn is_pks_only(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].primary_key
    }

    /// Same query projecting only the primary key
    pub fn pks_only(&self) -> QuerySpec {
        QuerySpec {
            fields: vec![self.pk.clone()],
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> FieldDescriptor {
        FieldDescriptor::new("age", FieldType::Integer)
    }

    #[test]
    fn test_lookup_parse_roundtrip() {
        for name in ["exact", "in", "startswith", "year", "icontains", "ancestor"] {
            let kind: LookupKind = name.parse().unwrap();
            assert_eq!(kind.as_str(), name);
        }
        assert!("like".parse::<LookupKind>().is_err());
    }

    #[test]
    fn test_native_and_text_classification() {
        assert!(LookupKind::Range.is_native());
        assert!(!LookupKind::Contains.is_native());
        assert!(LookupKind::IContains.is_text_match());
        assert!(!LookupKind::Gt.is_text_match());
    }

    #[test]
    fn test_normalize_collapses_single_child() {
        let leaf = FilterNode::leaf(&age(), LookupKind::Gt, 3i64);
        let tree = FilterNode::and(vec![FilterNode::or(vec![leaf.clone()])]);
        assert_eq!(tree.normalize(), leaf);
    }

    #[test]
    fn test_normalize_keeps_negation() {
        let leaf = FilterNode::leaf(&age(), LookupKind::Gt, 3i64);
        let tree = FilterNode::and(vec![FilterNode::not(leaf.clone())]);
        match tree.normalize() {
            FilterNode::Connector { negated, children, .. } => {
                assert!(negated);
                assert_eq!(children, vec![leaf]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_normalize_folds_double_negation() {
        let leaf = FilterNode::leaf(&age(), LookupKind::Gt, 3i64);
        let a = FilterNode::leaf(&age(), LookupKind::Lt, 9i64);
        let inner = FilterNode::not(FilterNode::or(vec![leaf, a]));
        let tree = FilterNode::not(FilterNode::and(vec![inner]));
        match tree.normalize() {
            FilterNode::Connector { connector, negated, .. } => {
                assert_eq!(connector, Connector::Or);
                assert!(!negated);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pks_only_projection() {
        let pk = FieldDescriptor::primary_key("id");
        let spec = QuerySpec::new("User", pk.clone()).with_fields(vec![age()]);
        assert!(!spec.is_pks_only());
        assert!(spec.pks_only().is_pks_only());
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let json = serde_json::json!({
            "kind": "User",
            "pk": {"name": "id", "column": "id", "primary_key": true, "field_type": "Key"},
            "filter": {"Leaf": {
                "field": {"name": "age", "column": "age", "field_type": "Integer"},
                "lookup": "gt",
                "value": {"Int": 10}
            }}
        });
        let spec: QuerySpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.low_mark, 0);
        assert!(spec.high_mark.is_none());
        assert!(matches!(spec.filter, Some(FilterNode::Leaf { lookup: LookupKind::Gt, .. })));
    }
}
