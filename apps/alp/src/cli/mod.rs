//! # Alp CLI Module
//!
//! This module implements the CLI interface for Alp.
//!
//! ## Available Commands
//!
//! - `dbs` - List databases (default)
//! - `stores` - List the stores of a database
//! - `create-db` / `create-store` / `drop-db` - Schema management
//! - `get` / `put` / `del` - Single-record access by path
//! - `ls` - Grouped listing of every record
//! - `path` - Show how a path resolves
//! - `status` - Backend and record counts

mod commands;

use crate::config::{self, Overrides};
use alp_core::{AlpError, App};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Alp - path-addressed record registry
///
/// Records live at `db/store:record` paths; `AlpDB` and `alp` are implied
/// when omitted.
#[derive(Parser, Debug)]
#[command(name = "alp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./alp.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the redb database files
    #[arg(short = 'D', long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory for this run
    #[arg(short, long, global = true)]
    pub memory: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The flag subset that feeds configuration.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config: self.config.clone(),
            data_dir: self.data_dir.clone(),
            memory: self.memory,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List databases
    Dbs,

    /// List the stores of a database
    Stores {
        /// Database name
        db: String,
    },

    /// Create a database with one or more stores
    CreateDb {
        /// Database name
        name: String,

        /// Initial stores (the default store when empty)
        stores: Vec<String>,
    },

    /// Add a store to an existing database
    CreateStore {
        /// Database name
        db: String,

        /// Store name
        store: String,
    },

    /// Close a database and delete its file
    DropDb {
        /// Database name
        name: String,
    },

    /// Print the record at a path
    Get {
        /// Record path
        path: String,
    },

    /// Store JSON at a path
    Put {
        /// Record path
        path: String,

        /// JSON document
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        json: Option<String>,

        /// Read the JSON document from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Delete the record at a path
    Del {
        /// Record path
        path: String,
    },

    /// List records grouped by database and store
    Ls {
        /// Only this database
        #[arg(long)]
        db: Option<String>,

        /// Only this store
        #[arg(long)]
        store: Option<String>,
    },

    /// Show how a path is parsed, canonicalized and displayed
    Path {
        /// Path to inspect
        input: String,
    },

    /// Show backend and record counts
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AlpError> {
    let config = config::from_process_env(&cli.overrides())?;
    if cli.verbose {
        tracing::info!("Using config: {:?}", config);
    }
    let app = App::new(config)?;
    let command = cli.command.unwrap_or(Commands::Dbs);
    let output = run(&app, &command).await?;
    println!("{}", render(&command, &output, cli.json_mode));
    Ok(())
}
