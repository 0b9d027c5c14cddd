//! dsquery - relational queries over a hierarchical-key datastore
//!
//! Translates filter trees into conjunctive native sub-queries, evaluates
//! what the store can't express in memory, and coordinates inserts and
//! locked read-validate-write updates.

pub mod cli;
pub mod config;
pub mod datastore;
pub mod engine;
pub mod observability;
pub mod query;
pub mod write;

pub use engine::Engine;
