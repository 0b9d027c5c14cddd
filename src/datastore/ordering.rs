//! Entity ordering
//!
//! One comparison routine shared by the store's native sort, the ordered
//! union of fanned-out results and the in-memory sort of key-fetched
//! results, so all three agree.

use std::cmp::Ordering;

use super::entity::Entity;
use super::query::{Direction, KEY_PROPERTY};
use super::value::Value;

/// Value an entity sorts by for `column` in the given direction.
///
/// Lists sort by their smallest element ascending and their largest
/// element descending. `None` when the property is absent.
pub fn sort_value(entity: &Entity, column: &str, direction: Direction) -> Option<Value> {
    if column == KEY_PROPERTY {
        return Some(Value::Key(entity.key().clone()));
    }
    match entity.get(column)? {
        Value::List(items) => {
            let pick = items.iter().reduce(|best, item| {
                let ord = item.compare(best);
                let better = match direction {
                    Direction::Ascending => ord.is_lt(),
                    Direction::Descending => ord.is_gt(),
                };
                if better {
                    item
                } else {
                    best
                }
            });
            pick.cloned()
        }
        other => Some(other.clone()),
    }
}

/// Compares two entities by `orders`, then by key
pub fn compare_entities(a: &Entity, b: &Entity, orders: &[(String, Direction)]) -> Ordering {
    for (column, direction) in orders {
        let a_val = sort_value(a, column, *direction);
        let b_val = sort_value(b, column, *direction);

        let ord = match (a_val, b_val) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(&y),
        };

        let ord = match direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.key().cmp(b.key())
}
