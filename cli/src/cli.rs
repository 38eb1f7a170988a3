//! Command-line interface for smartfilter

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "smartfilter")]
#[command(about = "Filter spreadsheets with plain-language requirements")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Use this configuration file instead of the local/global lookup
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply one requirement to a file and print the resulting view
    Filter {
        /// Spreadsheet, CSV, TSV or JSON file
        input: PathBuf,

        /// What to keep, e.g. "orders over 100 from France, show customer and total"
        requirement: String,

        /// Write the filtered view to this file (.xlsx, .csv, .tsv or .json)
        #[arg(long)]
        export: Option<PathBuf>,

        /// Overwrite the export file if it exists
        #[arg(long, requires = "export")]
        force: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Maximum number of rows to print
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Print a bar chart preview of the result
        #[arg(long)]
        chart: bool,
    },

    /// Load a file and filter it interactively
    Shell {
        /// Spreadsheet, CSV, TSV or JSON file
        input: PathBuf,
    },

    /// Show the headers and leading rows of a file
    Inspect {
        /// Spreadsheet, CSV, TSV or JSON file
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Maximum number of rows to print
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Print a bar chart preview
        #[arg(long)]
        chart: bool,
    },

    /// Configure smartfilter settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the current configuration and where it came from
    Show,

    /// Write a configuration file with default settings
    Init {
        /// Write the global config (~/.smartfilter/global.toml) instead of ./smartfilter.toml
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
