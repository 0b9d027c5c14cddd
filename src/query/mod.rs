//! Query translation and constraint evaluation
//!
//! Turns a relational filter tree into native conjunctive sub-queries and
//! executes them:
//!
//! - `ast`: field descriptors, filter tree, query spec
//! - `decoder`: leaf decoding, hierarchical scope
//! - `builder`: conjunctive accumulation and validation
//! - `expander`: cartesian fan-out, primary-key fast path
//! - `lookups` / `evaluator`: in-memory predicate evaluation
//! - `pager` / `merge` / `cursors`: fetch, count, delete
//! - `explain`: compiled query description

mod ast;
mod builder;
mod cursors;
mod decoder;
mod errors;
mod evaluator;
mod expander;
mod explain;
mod lookups;
mod merge;
mod pager;

pub use ast::{Connector, FieldDescriptor, FieldType, FilterNode, LookupKind, OrderSpec, QuerySpec};
pub use builder::DatastoreQuery;
pub use cursors::{try_save_cursor, CursorStore, MemoryCursorStore};
pub use decoder::{decode, to_key_value, DecodedPredicate, ANCESTOR_COLUMN};
pub use errors::{QueryError, QueryResult};
pub use evaluator::Matcher;
pub use expander::PrimaryKeySet;
pub use explain::QueryExplain;
pub use lookups::{emulated, LookupFn};
pub use merge::MergedStream;
pub use pager::FetchResults;

pub(crate) use pager::storage_failure;
