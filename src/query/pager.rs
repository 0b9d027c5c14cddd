//! Result paging
//!
//! Executes a compiled `DatastoreQuery`:
//!
//! - Key fast path: batch get, in-memory evaluation and sort, then slice
//! - One sub-query: lazy native stream, cursor saved when it finishes
//! - Several sub-queries: ordered merge of native streams
//! - Emulated queries: unbounded native candidates filtered in memory
//!
//! Excluded primary keys are dropped after the fetch, so native windows
//! are widened by the exclusion count and the page is trimmed afterwards.

use crate::datastore::{
    compare_entities, Datastore, DatastoreError, DatastoreResult, Direction, Entity, Key, ResultStream, RunOptions,
};
use crate::observability::{log_event, EngineMetrics, Event};

use super::builder::DatastoreQuery;
use super::cursors::{try_save_cursor, CursorStore};
use super::errors::{QueryError, QueryResult};
use super::evaluator::Matcher;
use super::merge::MergedStream;

/// Logs and counts a failed store call and wraps it as `QueryError::Storage`
pub(crate) fn storage_failure(metrics: &EngineMetrics, operation: &str, err: DatastoreError) -> QueryError {
    metrics.increment_storage_failures();
    log_event(
        Event::StorageFailure,
        &[
            ("operation", operation),
            ("code", err.code()),
            ("error", err.to_string().as_str()),
        ],
    );
    QueryError::Storage(err)
}

enum Source<'a> {
    Empty,
    Materialized(std::vec::IntoIter<Entity>),
    Single(Box<dyn ResultStream + 'a>),
    Merged(MergedStream<'a>),
}

impl Source<'_> {
    fn next(&mut self) -> Option<DatastoreResult<Entity>> {
        match self {
            Source::Empty => None,
            Source::Materialized(items) => items.next().map(Ok),
            Source::Single(stream) => stream.next(),
            Source::Merged(merged) => merged.next(),
        }
    }
}

fn combine<'a>(mut streams: Vec<Box<dyn ResultStream + 'a>>, orders: &[(String, Direction)]) -> Source<'a> {
    if streams.len() == 1 {
        if let Some(stream) = streams.pop() {
            return Source::Single(stream);
        }
    }
    Source::Merged(MergedStream::new(streams, orders))
}

struct CursorSink<'a> {
    store: &'a dyn CursorStore,
    query_id: &'a str,
}

/// Lazy, forward-only page of results.
///
/// Store failures surface as `QueryError::Storage` items and end the
/// sequence.
pub struct FetchResults<'a> {
    source: Source<'a>,
    excluded: &'a [Key],
    matcher: Option<&'a Matcher>,
    skip: usize,
    remaining: Option<usize>,
    project_keys: bool,
    cursor_sink: Option<CursorSink<'a>>,
    metrics: &'a EngineMetrics,
    done: bool,
}

impl<'a> FetchResults<'a> {
    fn empty(metrics: &'a EngineMetrics) -> Self {
        Self::new(Source::Empty, metrics)
    }

    fn new(source: Source<'a>, metrics: &'a EngineMetrics) -> Self {
        Self {
            source,
            excluded: &[],
            matcher: None,
            skip: 0,
            remaining: None,
            project_keys: false,
            cursor_sink: None,
            metrics,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        if let (Some(sink), Source::Single(stream)) = (self.cursor_sink.take(), &self.source) {
            try_save_cursor(sink.store, sink.query_id, stream.compiled_cursor(), self.metrics);
        }
    }
}

impl Iterator for FetchResults<'_> {
    type Item = QueryResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.remaining == Some(0) {
                self.finish();
                return None;
            }

            let entity = match self.source.next() {
                None => {
                    self.finish();
                    return None;
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(storage_failure(self.metrics, "run", err)));
                }
                Some(Ok(entity)) => entity,
            };

            if self.excluded.contains(entity.key()) {
                self.metrics.increment_records_excluded();
                continue;
            }
            if let Some(matcher) = self.matcher {
                if !matcher.matches(&entity) {
                    self.metrics.increment_records_rejected();
                    continue;
                }
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }

            return Some(Ok(if self.project_keys {
                entity.key_only()
            } else {
                entity
            }));
        }
    }
}

impl<'e, D: Datastore> DatastoreQuery<'e, D> {
    /// Fetches results `[low, high)`; `high = None` is unbounded
    pub fn fetch(&self, low: usize, high: Option<usize>) -> QueryResult<FetchResults<'_>> {
        let metrics = self.engine.metrics();
        let page = high.map(|h| h.saturating_sub(low));
        if page == Some(0) {
            return Ok(FetchResults::empty(metrics));
        }

        if self.pk_set.included().is_some() {
            let entities = self.matching_pks(low, high)?;
            self.log_fetch("keys", 0);
            let mut results = FetchResults::new(Source::Materialized(entities.into_iter()), metrics);
            results.project_keys = self.pks_only;
            return Ok(results);
        }

        let queries = self.build_queries();
        let excluded = self.pk_set.excluded();
        let store = self.engine.store();
        metrics.add_sub_queries_executed(queries.len() as u64);

        let mut results = if self.emulated {
            self.log_fetch("emulated", queries.len());
            let mut streams = Vec::with_capacity(queries.len());
            for query in &queries {
                streams.push(self.engine.storage("run", store.run(query, RunOptions::unbounded()))?);
            }
            let mut results = FetchResults::new(combine(streams, &self.ordering), metrics);
            results.matcher = Some(&self.matcher);
            results.skip = low;
            results
        } else if let [query] = queries.as_slice() {
            self.log_fetch("native", 1);
            // excluded keys may sit before `low`, so the offset moves in memory
            let (options, skip) = match (high, excluded.is_empty()) {
                (None, true) => (
                    RunOptions {
                        offset: low,
                        limit: None,
                    },
                    0,
                ),
                (Some(high), true) => (RunOptions::window(low, high - low), 0),
                (high, false) => (
                    RunOptions {
                        offset: 0,
                        limit: high.map(|h| h + excluded.len()),
                    },
                    low,
                ),
            };
            let stream = self.engine.storage("run", store.run(query, options))?;
            let mut results = FetchResults::new(Source::Single(stream), metrics);
            results.skip = skip;
            results.cursor_sink = Some(CursorSink {
                store: self.engine.cursor_store(),
                query_id: &self.query_id,
            });
            results
        } else {
            self.log_fetch("merged", queries.len());
            let options = RunOptions {
                offset: 0,
                limit: high.map(|h| h + excluded.len()),
            };
            let mut streams = Vec::with_capacity(queries.len());
            for query in &queries {
                streams.push(self.engine.storage("run", store.run(query, options))?);
            }
            let mut results = FetchResults::new(combine(streams, &self.ordering), metrics);
            results.skip = low;
            results
        };

        results.excluded = excluded;
        results.remaining = page;
        results.project_keys = self.pks_only;
        Ok(results)
    }

    fn log_fetch(&self, path: &str, sub_queries: usize) {
        let sub_queries = sub_queries.to_string();
        log_event(
            Event::FetchExecuted,
            &[
                ("kind", self.kind.as_str()),
                ("path", path),
                ("sub_queries", sub_queries.as_str()),
            ],
        );
    }

    /// Key fast path: batch get, evaluate, sort, slice
    fn matching_pks(&self, low: usize, high: Option<usize>) -> QueryResult<Vec<Entity>> {
        let included = match self.pk_set.included() {
            Some(keys) if !keys.is_empty() => keys,
            _ => return Ok(Vec::new()),
        };

        let metrics = self.engine.metrics();
        metrics.increment_fast_path_lookups();
        let fetched = self.engine.storage("get", self.engine.store().get(included))?;

        let mut results = Vec::with_capacity(fetched.len());
        for entity in fetched.into_iter().flatten() {
            if self.pk_set.is_excluded(entity.key()) {
                metrics.increment_records_excluded();
                continue;
            }
            let in_scope = self
                .ancestor
                .as_ref()
                .map_or(true, |ancestor| entity.key().has_ancestor(ancestor));
            if !in_scope || !self.matcher.matches(&entity) {
                metrics.increment_records_rejected();
                continue;
            }
            results.push(entity);
        }

        if !self.ordering.is_empty() {
            results.sort_by(|a, b| compare_entities(a, b, &self.ordering));
        }

        let end = high.map_or(results.len(), |h| h.min(results.len()));
        let start = low.min(end);
        Ok(results.drain(start..end).collect())
    }

    /// Counts matching entities, up to `limit`
    pub fn count(&self, limit: Option<usize>) -> QueryResult<usize> {
        let (path, count) = if self.pk_set.included().is_some() {
            ("keys", self.matching_pks(0, limit)?.len())
        } else if !self.pk_set.excluded().is_empty() {
            // Native counts can't subtract exclusions
            let cap = self.engine.config().exclusion_count_cap;
            let bound = limit.map_or(cap, |l| l.min(cap));
            ("exclusions", self.count_fetched(Some(bound))?)
        } else if self.emulated || self.queries.len() > 1 {
            ("fetched", self.count_fetched(limit)?)
        } else {
            let queries = self.build_queries();
            self.engine.metrics().add_sub_queries_executed(1);
            let mut total = 0;
            for query in &queries {
                total += self.engine.storage("count", self.engine.store().count(query, limit))?;
            }
            ("native", total)
        };

        let rendered = count.to_string();
        log_event(
            Event::CountExecuted,
            &[("kind", self.kind.as_str()), ("path", path), ("count", rendered.as_str())],
        );
        Ok(count)
    }

    fn count_fetched(&self, limit: Option<usize>) -> QueryResult<usize> {
        let mut count = 0;
        for entity in self.fetch(0, limit)? {
            entity?;
            count += 1;
        }
        Ok(count)
    }

    /// Deletes every entity in the query's limits with one batch delete;
    /// returns how many keys were deleted
    pub fn delete(&self) -> QueryResult<usize> {
        let keys: Vec<Key> = if self.pk_set.included().is_some() {
            self.matching_pks(self.low_mark, self.high_mark)?
                .into_iter()
                .map(|entity| entity.key().clone())
                .collect()
        } else {
            self.fetch(self.low_mark, self.high_mark)?
                .map(|entity| entity.map(|e| e.key().clone()))
                .collect::<QueryResult<Vec<_>>>()?
        };

        if !keys.is_empty() {
            self.engine.storage("delete", self.engine.store().delete(&keys))?;
        }

        let count = keys.len().to_string();
        log_event(
            Event::DeleteExecuted,
            &[("kind", self.kind.as_str()), ("deleted", count.as_str())],
        );
        Ok(keys.len())
    }
}
