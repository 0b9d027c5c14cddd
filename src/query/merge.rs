//! Ordered union of fanned-out sub-query results
//!
//! Every input stream is already sorted by the same order list, so a k-way
//! merge under `compare_entities` keeps the declared ordering. An entity
//! reached through more than one sub-query is yielded once.

use std::collections::HashSet;

use crate::datastore::{compare_entities, DatastoreResult, Direction, Entity, Key, ResultStream};

struct Lane<'a> {
    stream: Box<dyn ResultStream + 'a>,
    head: Option<Entity>,
    done: bool,
}

/// Lazy merge of several native result streams
pub struct MergedStream<'a> {
    lanes: Vec<Lane<'a>>,
    orders: Vec<(String, Direction)>,
    seen: HashSet<Key>,
    failed: bool,
}

impl<'a> MergedStream<'a> {
    pub fn new(streams: Vec<Box<dyn ResultStream + 'a>>, orders: &[(String, Direction)]) -> Self {
        Self {
            lanes: streams
                .into_iter()
                .map(|stream| Lane {
                    stream,
                    head: None,
                    done: false,
                })
                .collect(),
            orders: orders.to_vec(),
            seen: HashSet::new(),
            failed: false,
        }
    }

    /// Pulls the next entity into every empty lane
    fn fill(&mut self) -> DatastoreResult<()> {
        for lane in &mut self.lanes {
            if lane.head.is_none() && !lane.done {
                match lane.stream.next() {
                    Some(Ok(entity)) => lane.head = Some(entity),
                    Some(Err(err)) => {
                        lane.done = true;
                        return Err(err);
                    }
                    None => lane.done = true,
                }
            }
        }
        Ok(())
    }

    fn pop_min(&mut self) -> Option<Entity> {
        let orders = &self.orders;
        let index = self
            .lanes
            .iter()
            .enumerate()
            .filter_map(|(i, lane)| lane.head.as_ref().map(|e| (i, e)))
            .min_by(|(_, a), (_, b)| compare_entities(a, b, orders))
            .map(|(i, _)| i)?;
        self.lanes[index].head.take()
    }
}

impl Iterator for MergedStream<'_> {
    type Item = DatastoreResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Err(err) = self.fill() {
                self.failed = true;
                return Some(Err(err));
            }
            let entity = self.pop_min()?;
            if self.seen.insert(entity.key().clone()) {
                return Some(Ok(entity));
            }
        }
    }
}
