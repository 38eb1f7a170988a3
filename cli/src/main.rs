//! Main entry point for smartfilter CLI

use clap::Parser;

mod cli;
mod commands;
mod output;
mod progress;
mod shell;

use cli::Cli;
use commands::execute_command;

#[tokio::main]
async fn main() {
    // Load environment variables (API keys) from .env file if present
    if std::path::Path::new(".env").exists() {
        if let Err(e) = dotenv::dotenv() {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // Initialize logging; RUST_LOG still refines per-module levels
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = execute_command(cli.command, cli.config.as_deref()).await {
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }
}
