//! Write coordination
//!
//! - `insert`: key assignment, hierarchical parents, unindexed columns
//! - `update`: locked read-validate-write per candidate key
//! - `expression`: per-record computed values
//! - `locks`: per-key advisory locks

mod expression;
mod insert;
mod locks;
mod update;

pub use expression::Expression;
pub use insert::{AncestorKey, InsertRow, PrimaryKeyValue};
pub use locks::{LockGuard, LockRegistry};
pub use update::{Assignment, UpdateValue};
