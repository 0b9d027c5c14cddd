//! CLI command implementations
//!
//! Both commands are one-shot: load the inputs, build an engine over an
//! in-memory store, print one JSON object and exit. Nothing is persisted.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::datastore::{Entity, MemoryDatastore};
use crate::engine::Engine;
use crate::query::QuerySpec;

use super::args::Command;
use super::errors::CliResult;
use super::io::{read_json_file, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    let result = run_command(cli.command);
    if let Err(e) = &result {
        write_error(e.code_str(), e.message())?;
    }
    result
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let report = match cmd {
        Command::Explain { query, config } => explain(&query, config.as_deref())?,
        Command::Run { query, data, config } => run_query(&query, &data, config.as_deref())?,
    };
    write_response(report)
}

/// Compiles the query and describes its native sub-queries
pub fn explain(query_path: &Path, config_path: Option<&Path>) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let spec: QuerySpec = read_json_file(query_path)?;

    let engine = Engine::with_config(MemoryDatastore::new(), config);
    let query = engine.query(&spec)?;
    let explain = query.explain();

    Ok(json!({
        "explain": explain,
        "text": explain.to_string(),
    }))
}

/// Loads the entities, runs the query over its own limits and reports the
/// page together with the engine counters
pub fn run_query(query_path: &Path, data_path: &Path, config_path: Option<&Path>) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let spec: QuerySpec = read_json_file(query_path)?;
    let entities: Vec<Entity> = read_json_file(data_path)?;

    let engine = Engine::with_config(MemoryDatastore::with_entities(entities)?, config);
    let results = engine.fetch_all(&spec)?;

    Ok(json!({
        "count": results.len(),
        "entities": results,
        "metrics": engine.metrics().snapshot(),
    }))
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::datastore::{Key, Value as DsValue};
    use crate::query::{FieldDescriptor, FieldType, FilterNode, LookupKind, OrderSpec};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn age() -> FieldDescriptor {
        FieldDescriptor::new("age", FieldType::Integer)
    }

    fn write_query(dir: &TempDir, spec: &QuerySpec) -> PathBuf {
        let path = dir.path().join("query.json");
        fs::write(&path, serde_json::to_string(spec).unwrap()).unwrap();
        path
    }

    fn write_data(dir: &TempDir) -> PathBuf {
        let entities: Vec<Entity> = (1..=5i64)
            .map(|i| Entity::new(Key::from_path("Person", i)).with("age", i * 10))
            .collect();
        let path = dir.path().join("data.json");
        fs::write(&path, serde_json::to_string(&entities).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_explain_reports_sub_queries() {
        let dir = TempDir::new().unwrap();
        let spec = QuerySpec::new("Person", FieldDescriptor::primary_key("id")).with_filter(FilterNode::leaf(
            &age(),
            LookupKind::In,
            DsValue::List(vec![DsValue::Int(20), DsValue::Int(30)]),
        ));
        let report = explain(&write_query(&dir, &spec), None).unwrap();

        assert_eq!(report["explain"]["sub_queries"].as_array().unwrap().len(), 2);
        assert!(report["text"].as_str().unwrap().contains("KIND Person"));
    }

    #[test]
    fn test_run_returns_page_and_metrics() {
        let dir = TempDir::new().unwrap();
        let spec = QuerySpec::new("Person", FieldDescriptor::primary_key("id"))
            .with_filter(FilterNode::leaf(&age(), LookupKind::Gt, 15i64))
            .order_by(OrderSpec::desc(&age()))
            .with_limits(0, Some(2));
        let report = run_query(&write_query(&dir, &spec), &write_data(&dir), None).unwrap();

        assert_eq!(report["count"], json!(2));
        assert_eq!(report["metrics"]["queries_compiled"], json!(1));
        assert_eq!(report["entities"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_validation_error_maps_to_query_code() {
        let dir = TempDir::new().unwrap();
        let spec = QuerySpec::new("Person", FieldDescriptor::primary_key("id"))
            .with_filter(FilterNode::not(FilterNode::leaf(&age(), LookupKind::In, DsValue::List(vec![]))));
        let err = explain(&write_query(&dir, &spec), None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::QueryError);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.json");
        fs::write(&config, r#"{"max_in_combinations": 0}"#).unwrap();
        let spec = QuerySpec::new("Person", FieldDescriptor::primary_key("id"));
        let err = explain(&write_query(&dir, &spec), Some(&config)).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}
