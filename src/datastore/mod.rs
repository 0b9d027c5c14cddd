//! Backing store model
//!
//! The engine talks to a hierarchical-key datastore through the `Datastore`
//! trait. The native query model is deliberately narrow:
//!
//! - Equality and range filters, AND-ed together
//! - At most one property under inequality
//! - No OR, no negation
//! - Ancestor scoping over the key hierarchy
//!
//! `MemoryDatastore` implements the same model in process.

mod entity;
mod errors;
mod key;
mod memory;
mod ordering;
mod query;
mod store;
mod value;

pub use entity::Entity;
pub use errors::{DatastoreError, DatastoreResult};
pub use key::{Key, KeyId, PathElement};
pub use memory::{MemoryDatastore, Operation};
pub use ordering::{compare_entities, sort_value};
pub use query::{Direction, FilterOperator, FilterValue, NativeFilter, NativeQuery, KEY_PROPERTY};
pub use store::{Cursor, Datastore, ResultStream, RunOptions};
pub use value::Value;
