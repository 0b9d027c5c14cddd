//! Expression-valued assignments
//!
//! An expression is resolved against the record fetched inside the update
//! loop, never cached across records. Arithmetic rules:
//! - int with int stays int, checked for overflow
//! - any float operand makes the result float
//! - text `+` text concatenates
//! - null in, null out

use serde::{Deserialize, Serialize};

use crate::datastore::{Entity, Value};
use crate::query::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        }
    }
}

/// Value computed from the current record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Value(Value),
    /// Current value of a column; missing columns read as null
    Column(String),
    Add(Box<Expression>, Box<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Mul(Box<Expression>, Box<Expression>),
    Div(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn value(value: impl Into<Value>) -> Self {
        Expression::Value(value.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn plus(self, rhs: Expression) -> Self {
        Expression::Add(Box::new(self), Box::new(rhs))
    }

    pub fn minus(self, rhs: Expression) -> Self {
        Expression::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn times(self, rhs: Expression) -> Self {
        Expression::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn over(self, rhs: Expression) -> Self {
        Expression::Div(Box::new(self), Box::new(rhs))
    }

    /// Resolves the expression against `entity`
    pub fn evaluate(&self, entity: &Entity) -> QueryResult<Value> {
        match self {
            Expression::Value(value) => Ok(value.clone()),
            Expression::Column(name) => Ok(entity.get(name).cloned().unwrap_or(Value::Null)),
            Expression::Add(l, r) => Self::apply(Op::Add, l.evaluate(entity)?, r.evaluate(entity)?),
            Expression::Sub(l, r) => Self::apply(Op::Sub, l.evaluate(entity)?, r.evaluate(entity)?),
            Expression::Mul(l, r) => Self::apply(Op::Mul, l.evaluate(entity)?, r.evaluate(entity)?),
            Expression::Div(l, r) => Self::apply(Op::Div, l.evaluate(entity)?, r.evaluate(entity)?),
        }
    }

    fn apply(op: Op, lhs: Value, rhs: Value) -> QueryResult<Value> {
        let overflow = || QueryError::invalid_value(format!("integer overflow in '{}'", op.symbol()));
        match (lhs, rhs) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => {
                if op == Op::Div && b == 0 {
                    return Err(QueryError::invalid_value("division by zero"));
                }
                let result = match op {
                    Op::Add => a.checked_add(b),
                    Op::Sub => a.checked_sub(b),
                    Op::Mul => a.checked_mul(b),
                    Op::Div => a.checked_div(b),
                };
                result.map(Value::Int).ok_or_else(overflow)
            }
            (Value::Text(a), Value::Text(b)) if op == Op::Add => Ok(Value::Text(a + &b)),
            (a, b) => {
                let (Some(x), Some(y)) = (Self::as_f64(&a), Self::as_f64(&b)) else {
                    return Err(QueryError::invalid_value(format!(
                        "can't apply '{}' to {} and {}",
                        op.symbol(),
                        a.type_name(),
                        b.type_name()
                    )));
                };
                if op == Op::Div && y == 0.0 {
                    return Err(QueryError::invalid_value("division by zero"));
                }
                Ok(Value::Float(match op {
                    Op::Add => x + y,
                    Op::Sub => x - y,
                    Op::Mul => x * y,
                    Op::Div => x / y,
                }))
            }
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::Key;

    fn counter(n: i64) -> Entity {
        Entity::new(Key::from_path("Counter", 1i64))
            .with("n", n)
            .with("label", "hits")
            .with("ratio", 0.5)
    }

    #[test]
    fn test_column_arithmetic() {
        let expr = Expression::column("n").plus(Expression::value(1i64));
        assert_eq!(expr.evaluate(&counter(41)).unwrap(), Value::Int(42));

        let expr = Expression::column("n").times(Expression::column("ratio"));
        assert_eq!(expr.evaluate(&counter(10)).unwrap(), Value::Float(5.0));

        let expr = Expression::column("n").over(Expression::value(3i64));
        assert_eq!(expr.evaluate(&counter(10)).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_text_concat_and_null() {
        let expr = Expression::column("label").plus(Expression::value("!"));
        assert_eq!(expr.evaluate(&counter(0)).unwrap(), Value::from("hits!"));

        let expr = Expression::column("missing").minus(Expression::value(1i64));
        assert_eq!(expr.evaluate(&counter(0)).unwrap(), Value::Null);
    }

    #[test]
    fn test_errors() {
        let div = Expression::column("n").over(Expression::value(0i64));
        assert!(matches!(div.evaluate(&counter(1)), Err(QueryError::InvalidValue(_))));

        let overflow = Expression::column("n").plus(Expression::value(1i64));
        assert!(overflow.evaluate(&counter(i64::MAX)).is_err());

        let mismatch = Expression::column("label").minus(Expression::value(1i64));
        assert!(mismatch.evaluate(&counter(0)).is_err());
    }
}
