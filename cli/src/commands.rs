//! Command implementations for smartfilter CLI

use crate::cli::{Commands, ConfigCommand};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::Spinner;
use crate::shell;
use log::debug;
use smartfilter_core::chart::bar_chart;
use smartfilter_core::config::{self, Config};
use smartfilter_core::error::{Result, SmartFilterError};
use smartfilter_core::{model, ExportOptions, Session};
use std::path::{Path, PathBuf};

/// Execute a command
pub async fn execute_command(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Filter {
            input,
            requirement,
            export,
            force,
            json,
            limit,
            chart,
        } => {
            let config = load_config(config_path)?;
            let output = FilterOutput {
                export,
                force,
                json,
                limit,
                chart,
            };
            filter_command(&config, &input, &requirement, &output).await
        }
        Commands::Shell { input } => shell_command(&load_config(config_path)?, &input).await,
        Commands::Inspect {
            input,
            json,
            limit,
            chart,
        } => inspect_command(&input, json, limit, chart).await,
        Commands::Config { command } => config_command(&command, config_path),
    }
}

/// `--config` wins over the regular lookup
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => {
            debug!("Using configuration file {}", path.display());
            config::load_config_file(path)
        }
        None => config::get_config(),
    }
}

fn session_for(config: &Config) -> Result<Session> {
    let model = model::from_config(&config.model)?;
    Ok(Session::from_config(model, config))
}

pub struct FilterOutput {
    pub export: Option<PathBuf>,
    pub force: bool,
    pub json: bool,
    pub limit: usize,
    pub chart: bool,
}

async fn filter_command(config: &Config, input: &Path, requirement: &str, output: &FilterOutput) -> Result<()> {
    let mut session = session_for(config)?;
    let spinner = Spinner::for_output("Loading file...", output.json);
    session.load_file(input).await?;
    spinner.set_message("Analyzing requirements...");
    let result = session.apply_filter(requirement).await;
    drop(spinner);
    let stats = result?;

    let dataset = session.dataset().ok_or(SmartFilterError::NoDataset)?;
    if output.json {
        let chart = if output.chart {
            bar_chart(&dataset.rows, &dataset.headers)
        } else {
            None
        };
        println!(
            "{}",
            JsonFormatter::format_view(dataset, output.limit, session.explanation(), Some(stats), chart)?
        );
    } else {
        PrettyPrinter::print_filter_outcome(session.explanation(), &stats);
        PrettyPrinter::print_view(dataset, output.limit);
        if output.chart {
            PrettyPrinter::print_chart(bar_chart(&dataset.rows, &dataset.headers).as_ref());
        }
    }

    if let Some(path) = &output.export {
        let options = ExportOptions {
            force: output.force,
            ..ExportOptions::from(&config.export)
        };
        let written = session.export(path, &options)?;
        if !output.json {
            println!("📤 Wrote {written} rows to {}", path.display());
        }
    }
    Ok(())
}

async fn shell_command(config: &Config, input: &Path) -> Result<()> {
    let mut session = session_for(config)?;
    let spinner = Spinner::new("Loading file...");
    session.load_file(input).await?;
    drop(spinner);
    shell::run(session, ExportOptions::from(&config.export)).await
}

/// Inspection needs no language model
async fn inspect_command(input: &Path, json: bool, limit: usize, chart: bool) -> Result<()> {
    let table = smartfilter_core::ingest::load_table_async(input.to_path_buf()).await?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let dataset = smartfilter_core::Dataset::new(name, table);

    if json {
        let chart = if chart {
            bar_chart(&dataset.rows, &dataset.headers)
        } else {
            None
        };
        println!("{}", JsonFormatter::format_view(&dataset, limit, None, None, chart)?);
    } else {
        PrettyPrinter::print_dataset_summary(&dataset);
        println!("Headers: {}", dataset.headers.join(", "));
        PrettyPrinter::print_view(&dataset, limit);
        if chart {
            PrettyPrinter::print_chart(bar_chart(&dataset.rows, &dataset.headers).as_ref());
        }
    }
    Ok(())
}

fn config_command(command: &ConfigCommand, config_path: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = load_config(config_path)?;
            let info = config::get_config_resolution_info()?;
            PrettyPrinter::print_config(&config, &info)
        }
        ConfigCommand::Init { global, force } => {
            let path = if *global {
                config::global_config_path()
            } else {
                config::local_config_path()?
            };
            init_config(&path, *force)
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(SmartFilterError::config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    config::save_config(&Config::default(), path)?;
    println!("✅ Wrote default configuration to {}", path.display());
    println!("Set API_KEY (or GEMINI_API_KEY) in the environment or a .env file to use the model.");
    Ok(())
}
