//! Query execution tests
//!
//! Exercises fetch, count and delete against the in-memory store, checking
//! both the results and the calls the engine made to get them.
//!
//! Test Categories:
//! 1. Primary-key fast path
//! 2. Exclusions and windows
//! 3. Cursors
//! 4. Storage failures

use std::sync::Arc;

use dsquery::datastore::{Datastore, Entity, Key, MemoryDatastore, Operation, RunOptions, Value};
use dsquery::query::{
    FieldDescriptor, FieldType, FilterNode, LookupKind, MemoryCursorStore, OrderSpec, QueryError, QuerySpec,
};
use dsquery::Engine;

fn pk() -> FieldDescriptor {
    FieldDescriptor::primary_key("id")
}

fn rank() -> FieldDescriptor {
    FieldDescriptor::new("rank", FieldType::Integer)
}

fn items(n: i64) -> Vec<Entity> {
    (1..=n)
        .map(|i| Entity::new(Key::from_path("Item", i)).with("rank", i * 10))
        .collect()
}

fn engine(n: i64) -> Engine<MemoryDatastore> {
    Engine::new(MemoryDatastore::with_entities(items(n)).unwrap())
}

fn ids(entities: &[Entity]) -> Vec<i64> {
    entities.iter().filter_map(|e| e.key().id()).collect()
}

// =============================================================================
// PRIMARY-KEY FAST PATH
// =============================================================================

/// `in` on the primary key batch-fetches the keys and runs no native query.
#[test]
fn test_pk_in_uses_batch_get() {
    let engine = engine(10);
    let spec = QuerySpec::new("Item", pk()).with_filter(FilterNode::leaf(&pk(), LookupKind::In, vec![2i64, 4, 6]));
    let query = engine.query(&spec).unwrap();
    assert!(query.explain().uses_fast_path());

    let found = engine.fetch_all(&spec).unwrap();
    assert_eq!(ids(&found), vec![2, 4, 6]);
    assert_eq!(engine.store().calls(Operation::Get), 1);
    assert_eq!(engine.store().calls(Operation::Run), 0);
}

/// Records fetched by key are still checked against the other filters.
#[test]
fn test_fast_path_revalidates_in_memory() {
    let engine = engine(10);
    let spec = QuerySpec::new("Item", pk()).with_filter(FilterNode::and(vec![
        FilterNode::leaf(&pk(), LookupKind::In, vec![2i64, 4, 6, 99]),
        FilterNode::leaf(&rank(), LookupKind::Gt, 30i64),
    ]));

    assert_eq!(ids(&engine.fetch_all(&spec).unwrap()), vec![4, 6]);
    assert_eq!(engine.query(&spec).unwrap().count(None).unwrap(), 2);
    assert_eq!(engine.store().calls(Operation::Run), 0);
}

/// Fast-path results honour the requested order.
#[test]
fn test_fast_path_sorted_by_ordering() {
    let engine = engine(5);
    let spec = QuerySpec::new("Item", pk())
        .with_filter(FilterNode::leaf(&pk(), LookupKind::In, vec![1i64, 5, 3]))
        .order_by(OrderSpec::desc(&rank()));

    assert_eq!(ids(&engine.fetch_all(&spec).unwrap()), vec![5, 3, 1]);
}

// =============================================================================
// EXCLUSIONS AND WINDOWS
// =============================================================================

/// Delete with two excluded keys and high mark 5 asks the store for 7
/// records and deletes the 5 that survive.
#[test]
fn test_delete_widens_window_by_exclusions() {
    let engine = engine(10);
    let spec = QuerySpec::new("Item", pk())
        .with_filter(FilterNode::not(FilterNode::leaf(&pk(), LookupKind::In, vec![1i64, 3])))
        .order_by(OrderSpec::asc(&rank()))
        .with_limits(0, Some(5));
    let query = engine.query(&spec).unwrap();

    let deleted = query.delete().unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(engine.store().run_requests(), vec![RunOptions::window(0, 7)]);
    assert_eq!(engine.store().calls(Operation::Delete), 1);
    assert_eq!(engine.store().len(), 5);

    let remaining = engine
        .store()
        .get(&[Key::from_path("Item", 1i64), Key::from_path("Item", 3i64), Key::from_path("Item", 8i64)])
        .unwrap();
    assert!(remaining.iter().all(Option::is_some));
}

/// Offsets apply after the excluded keys are removed.
#[test]
fn test_offset_after_exclusion() {
    let engine = engine(8);
    let spec = QuerySpec::new("Item", pk())
        .with_filter(FilterNode::not(FilterNode::leaf(&pk(), LookupKind::Exact, 2i64)))
        .order_by(OrderSpec::asc(&rank()))
        .with_limits(1, Some(3));

    assert_eq!(ids(&engine.fetch_all(&spec).unwrap()), vec![3, 4]);
}

/// An excluded key ahead of the offset doesn't shift the next page.
#[test]
fn test_pages_disjoint_when_exclusion_precedes_offset() {
    let engine = engine(8);
    let page = |low: usize, high: Option<usize>| {
        let spec = QuerySpec::new("Item", pk())
            .with_filter(FilterNode::not(FilterNode::leaf(&pk(), LookupKind::Exact, 1i64)))
            .order_by(OrderSpec::asc(&rank()))
            .with_limits(low, high);
        ids(&engine.fetch_all(&spec).unwrap())
    };

    assert_eq!(page(0, Some(2)), vec![2, 3]);
    assert_eq!(page(2, Some(4)), vec![4, 5]);
    assert_eq!(page(4, None), vec![6, 7, 8]);
}

/// Counting with exclusions fetches instead of using native counts.
#[test]
fn test_count_with_exclusions_fetches() {
    let engine = engine(6);
    let spec = QuerySpec::new("Item", pk())
        .with_filter(FilterNode::not(FilterNode::leaf(&pk(), LookupKind::In, vec![1i64, 2])));
    let query = engine.query(&spec).unwrap();

    assert_eq!(query.count(None).unwrap(), 4);
    assert_eq!(engine.store().calls(Operation::Count), 0);
    assert_eq!(engine.store().calls(Operation::Run), 1);
}

/// A plain single query counts natively.
#[test]
fn test_native_count() {
    let engine = engine(6);
    let spec = QuerySpec::new("Item", pk()).with_filter(FilterNode::leaf(&rank(), LookupKind::Gte, 30i64));
    assert_eq!(engine.query(&spec).unwrap().count(None).unwrap(), 4);
    assert_eq!(engine.store().calls(Operation::Count), 1);
}

// =============================================================================
// CURSORS
// =============================================================================

/// A finished single-query fetch stores a cursor that resumes after it.
#[test]
fn test_cursor_saved_and_resumed() {
    let engine = engine(6);
    let spec = QuerySpec::new("Item", pk())
        .order_by(OrderSpec::asc(&rank()))
        .with_limits(0, Some(2))
        .with_query_id("page");

    assert_eq!(ids(&engine.fetch_all(&spec).unwrap()), vec![1, 2]);
    let cursor = engine.saved_cursor("page").unwrap();

    let next = QuerySpec::new("Item", pk())
        .order_by(OrderSpec::asc(&rank()))
        .with_limits(0, Some(2))
        .with_cursors(Some(cursor), None);
    assert_eq!(ids(&engine.fetch_all(&next).unwrap()), vec![3, 4]);
}

/// Cursor persistence failures never fail the fetch.
#[test]
fn test_cursor_failure_is_swallowed() {
    let cursors = Arc::new(MemoryCursorStore::new());
    cursors.set_failing(true);
    let engine = engine(4).with_cursor_store(Box::new(Arc::clone(&cursors)));
    let spec = QuerySpec::new("Item", pk()).with_query_id("page");

    assert_eq!(engine.fetch_all(&spec).unwrap().len(), 4);
    assert!(cursors.is_empty());
    assert_eq!(engine.metrics().snapshot().cursor_save_failures, 1);
}

// =============================================================================
// STORAGE FAILURES
// =============================================================================

/// Store failures surface as the single storage error kind.
#[test]
fn test_storage_failure_wrapped() {
    let engine = engine(3);
    engine.store().fail(Operation::Run);
    let spec = QuerySpec::new("Item", pk()).with_filter(FilterNode::leaf(&rank(), LookupKind::Gt, Value::Int(0)));

    let err = engine.fetch_all(&spec).unwrap_err();
    assert!(matches!(err, QueryError::Storage(_)));
    assert_eq!(err.code(), "DSQ_STORAGE_ERROR");
    assert!(!err.is_validation());

    engine.store().heal();
    assert_eq!(engine.fetch_all(&spec).unwrap().len(), 3);
}
