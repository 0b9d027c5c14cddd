//! CLI module for dsquery
//!
//! Provides one-shot commands:
//! - explain: compile a query and describe its native sub-queries
//! - run: execute a query over entities loaded from a JSON file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, run, run_command, run_query};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, write_error, write_response};
