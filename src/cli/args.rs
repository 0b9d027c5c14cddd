//! CLI argument definitions using clap
//!
//! Commands:
//! - dsquery explain --query <path> [--config <path>]
//! - dsquery run --query <path> --data <path> [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dsquery - relational query translation over a hierarchical-key datastore
#[derive(Parser, Debug)]
#[command(name = "dsquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a query and print its native sub-queries
    Explain {
        /// Path to the query JSON file
        #[arg(long)]
        query: PathBuf,

        /// Path to the engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a query against entities loaded into an in-memory store
    Run {
        /// Path to the query JSON file
        #[arg(long)]
        query: PathBuf,

        /// Path to a JSON array of entities
        #[arg(long)]
        data: PathBuf,

        /// Path to the engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
