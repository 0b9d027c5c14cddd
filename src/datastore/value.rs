//! Property values
//!
//! Values carry a total order used by the native engine for filters and
//! sort orders. Ordering rules:
//! - null < bool < number < timestamp < date < time < text < key < list
//! - ints and floats compare numerically with each other
//! - same type otherwise compares naturally

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::Key;

/// A single property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Key(Key),
    /// Multi-valued property
    List(Vec<Value>),
}

impl Value {
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Date(_) => 4,
            Value::Time(_) => 5,
            Value::Text(_) => 6,
            Value::Key(_) => 7,
            Value::List(_) => 8,
        }
    }

    /// Compares two values under the native total order
    pub fn compare(&self, other: &Value) -> Ordering {
        let (a_rank, b_rank) = (self.type_rank(), other.type_rank());
        if a_rank != b_rank {
            return a_rank.cmp(&b_rank);
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Key(a), Value::Key(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal,
        }
    }

    /// Equality under the native order (so `Int(1)` equals `Float(1.0)`)
    pub fn same_as(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for timestamp, date and time values
    pub fn is_temporal(&self) -> bool {
        matches!(self, Value::Timestamp(_) | Value::Date(_) | Value::Time(_))
    }

    /// Returns true for a list with no elements
    pub fn is_empty_list(&self) -> bool {
        matches!(self, Value::List(items) if items.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Value::Key(k) => Some(k),
            _ => None,
        }
    }

    /// Calendar year of a temporal value
    pub fn year(&self) -> Option<i32> {
        match self {
            Value::Timestamp(ts) => Some(ts.year()),
            Value::Date(d) => Some(d.year()),
            _ => None,
        }
    }

    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Key(_) => "key",
            Value::List(_) => "list",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Key> for Value {
    fn from(v: Key) -> Self {
        Value::Key(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_null_is_minimum() {
        let others = [
            Value::Bool(false),
            Value::Int(i64::MIN),
            Value::Float(f64::MIN),
            Value::Text(String::new()),
            Value::Timestamp(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()),
            Value::Key(Key::from_path("A", 1)),
        ];
        for other in &others {
            assert_eq!(Value::Null.compare(other), Ordering::Less);
        }
    }

    #[test]
    fn test_mixed_numeric_comparison() {
        assert!(Value::Int(1).same_as(&Value::Float(1.0)));
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::Float(-0.5).compare(&Value::Int(0)), Ordering::Less);
    }

    #[test]
    fn test_cross_type_uses_rank() {
        assert_eq!(Value::Int(100).compare(&Value::Text("1".into())), Ordering::Less);
        assert_eq!(Value::Bool(true).compare(&Value::Int(0)), Ordering::Less);
    }

    #[test]
    fn test_text_ordering() {
        assert_eq!(Value::from("abc").compare(&Value::from("abd")), Ordering::Less);
        assert_eq!(Value::from("ab").compare(&Value::from("abc")), Ordering::Less);
    }

    #[test]
    fn test_empty_list_detection() {
        assert!(Value::List(vec![]).is_empty_list());
        assert!(!Value::from(vec![1i64]).is_empty_list());
        assert!(!Value::Null.is_empty_list());
    }

    #[test]
    fn test_year_extraction() {
        let ts = Value::Timestamp(Utc.with_ymd_and_hms(2013, 11, 5, 12, 45, 21).unwrap());
        assert_eq!(ts.year(), Some(2013));
        assert_eq!(Value::Int(2013).year(), None);
    }
}
