//! JSON I/O handling for the CLI
//!
//! - Input: JSON files named on the command line
//! - Output: a single JSON object on stdout

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read and deserialize a JSON file
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
    if content.trim().is_empty() {
        return Err(CliError::io_error(format!("Empty input: {}", path.display())));
    }
    serde_json::from_str(&content)
        .map_err(|e| CliError::io_error(format!("Invalid JSON in {}: {}", path.display(), e)))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(&response)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(&response)
}

fn write_line(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
