//! Explain output
//!
//! Deterministic description of a compiled query: the native sub-queries
//! it will run, plus everything applied outside the store.

use std::fmt;

use serde::Serialize;

use crate::datastore::Datastore;

use super::builder::DatastoreQuery;

/// Compiled form of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryExplain {
    pub kind: String,
    /// One entry per native sub-query, `"<column> <op> <value>"` filters
    pub sub_queries: Vec<Vec<String>>,
    pub ordering: Vec<String>,
    pub ancestor: Option<String>,
    /// Set when the key fast path replaces native execution
    pub included_pks: Option<Vec<String>>,
    pub excluded_pks: Vec<String>,
    pub inequality_field: Option<String>,
    pub emulated: bool,
    pub keys_only: bool,
}

impl QueryExplain {
    pub fn from_query<D: Datastore>(query: &DatastoreQuery<'_, D>) -> Self {
        let built = query.build_queries();
        let sub_queries = built
            .iter()
            .map(|q| {
                q.filters()
                    .map(|(column, op, value)| format!("{} {} {:?}", column, op, value))
                    .collect()
            })
            .collect();

        Self {
            kind: query.kind().to_string(),
            sub_queries,
            ordering: query
                .ordering()
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction.as_str()))
                .collect(),
            ancestor: query.ancestor().map(|k| k.to_string()),
            included_pks: query
                .primary_keys()
                .included()
                .map(|keys| keys.iter().map(|k| k.to_string()).collect()),
            excluded_pks: query
                .primary_keys()
                .excluded()
                .iter()
                .map(|k| k.to_string())
                .collect(),
            inequality_field: query.inequality_field().map(str::to_string),
            emulated: query.is_emulated(),
            keys_only: built.first().map_or(false, |q| q.is_keys_only()),
        }
    }

    /// Returns true when no native sub-query will run
    pub fn uses_fast_path(&self) -> bool {
        self.included_pks.is_some()
    }
}

impl fmt::Display for QueryExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "KIND {}", self.kind)?;
        if let Some(keys) = &self.included_pks {
            writeln!(f, "KEYS [{}]", keys.join(", "))?;
        } else {
            for (i, filters) in self.sub_queries.iter().enumerate() {
                writeln!(f, "SUBQUERY {}: {}", i, filters.join(" AND "))?;
            }
        }
        if !self.excluded_pks.is_empty() {
            writeln!(f, "EXCLUDE [{}]", self.excluded_pks.join(", "))?;
        }
        if !self.ordering.is_empty() {
            writeln!(f, "ORDER BY {}", self.ordering.join(", "))?;
        }
        if let Some(ancestor) = &self.ancestor {
            writeln!(f, "ANCESTOR {}", ancestor)?;
        }
        if self.emulated {
            writeln!(f, "EMULATED")?;
        }
        Ok(())
    }
}

impl<'e, D: Datastore> DatastoreQuery<'e, D> {
    pub fn explain(&self) -> QueryExplain {
        QueryExplain::from_query(self)
    }
}
