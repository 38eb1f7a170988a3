//! Interactive filtering loop

use crate::output::PrettyPrinter;
use crate::progress::Spinner;
use smartfilter_core::chart::bar_chart;
use smartfilter_core::error::{Result, SmartFilterError};
use smartfilter_core::export::suggested_export_name;
use smartfilter_core::{ExportFormat, ExportOptions, Session};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const DEFAULT_ROWS: usize = 20;

const HELP: &str = "\
Type a requirement in plain language to filter the data, e.g.
  products over 100 in the Tools category, show name and price

Commands:
  :help              Show this help
  :rows [N]          Print the current view (default 20 rows)
  :reset             Show all rows and columns again
  :history           List previous views, most recent first
  :use N             Restore history entry N
  :drop N            Remove history entry N
  :chart             Bar chart preview of the current view
  :export [PATH] [--force]
                     Write the current view to .xlsx, .csv, .tsv or .json
                     (default: <file>_filtered.xlsx)
  :load PATH         Load another file (history is kept)
  :quit              Leave the shell

Press Ctrl-C while a filter is running to cancel it, or at the prompt to leave.";

#[derive(Debug, PartialEq)]
pub enum ShellInput {
    Empty,
    Requirement(String),
    Help,
    Rows(Option<usize>),
    Reset,
    History,
    Use(usize),
    Drop(usize),
    Chart,
    Export { path: Option<PathBuf>, force: bool },
    Load(PathBuf),
    Quit,
    Invalid(String),
}

fn history_position(arg: Option<&str>, command: &str) -> std::result::Result<usize, String> {
    match arg.map(str::parse::<usize>) {
        Some(Ok(n)) if n > 0 => Ok(n),
        _ => Err(format!("Usage: :{command} N (N is the position shown by :history)")),
    }
}

pub fn parse_input(line: &str) -> ShellInput {
    let line = line.trim();
    if line.is_empty() {
        return ShellInput::Empty;
    }
    let Some(command) = line.strip_prefix(':') else {
        return ShellInput::Requirement(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();
    let first = rest.first().copied();

    match name {
        "help" | "h" | "?" => ShellInput::Help,
        "rows" => match first.map(str::parse::<usize>) {
            None => ShellInput::Rows(None),
            Some(Ok(n)) => ShellInput::Rows(Some(n)),
            Some(Err(_)) => ShellInput::Invalid("Usage: :rows [N]".to_string()),
        },
        "reset" => ShellInput::Reset,
        "history" => ShellInput::History,
        "use" => history_position(first, "use").map_or_else(ShellInput::Invalid, ShellInput::Use),
        "drop" => history_position(first, "drop").map_or_else(ShellInput::Invalid, ShellInput::Drop),
        "chart" => ShellInput::Chart,
        "export" => {
            let force = rest.contains(&"--force");
            let path: Vec<&str> = rest.iter().copied().filter(|p| *p != "--force").collect();
            ShellInput::Export {
                path: (!path.is_empty()).then(|| PathBuf::from(path.join(" "))),
                force,
            }
        }
        "load" if !rest.is_empty() => ShellInput::Load(PathBuf::from(rest.join(" "))),
        "load" => ShellInput::Invalid("Usage: :load PATH".to_string()),
        "quit" | "q" | "exit" => ShellInput::Quit,
        other => ShellInput::Invalid(format!("Unknown command ':{other}'. Type :help for a list.")),
    }
}

/// Run the shell on stdin until `:quit`, Ctrl-C at the prompt, or end of input
pub async fn run(session: Session, export_defaults: ExportOptions) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    run_with(session, export_defaults, stdin, ctrl_c_listener()).await
}

/// One listener for the whole shell; each Ctrl-C becomes a message
fn ctrl_c_listener() -> UnboundedReceiver<()> {
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if sender.send(()).is_err() {
                break;
            }
        }
    });
    receiver
}

async fn run_with<R>(
    mut session: Session,
    export_defaults: ExportOptions,
    input: R,
    mut interrupts: UnboundedReceiver<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    println!("Type :help for commands.");
    if let Some(dataset) = session.dataset() {
        PrettyPrinter::print_dataset_summary(dataset);
    }

    let mut lines = input.lines();
    loop {
        print!("smartfilter> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            biased;
            Some(()) = interrupts.recv() => None,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            ShellInput::Empty => {}
            ShellInput::Quit => break,
            input => {
                if let Err(e) = handle(&mut session, input, &export_defaults, &mut interrupts).await {
                    eprintln!("❌ {}", e.user_message());
                }
            }
        }
    }
    Ok(())
}

async fn handle(
    session: &mut Session,
    input: ShellInput,
    export_defaults: &ExportOptions,
    interrupts: &mut UnboundedReceiver<()>,
) -> Result<()> {
    match input {
        ShellInput::Requirement(requirement) => filter(session, &requirement, interrupts).await,
        ShellInput::Help => {
            println!("{HELP}");
            Ok(())
        }
        ShellInput::Rows(limit) => {
            let dataset = session.dataset().ok_or(SmartFilterError::NoDataset)?;
            PrettyPrinter::print_view(dataset, limit.unwrap_or(DEFAULT_ROWS));
            Ok(())
        }
        ShellInput::Reset => {
            let dataset = session.reset()?;
            PrettyPrinter::print_dataset_summary(dataset);
            Ok(())
        }
        ShellInput::History => {
            PrettyPrinter::print_history(session.history(), session.dataset().map(|d| d.view_id));
            Ok(())
        }
        ShellInput::Use(position) => {
            let view_id = history_entry(session, position)?;
            let dataset = session.select_history(view_id)?;
            PrettyPrinter::print_dataset_summary(dataset);
            Ok(())
        }
        ShellInput::Drop(position) => {
            let view_id = history_entry(session, position)?;
            session.remove_history(view_id);
            println!("Removed history entry {position}");
            Ok(())
        }
        ShellInput::Chart => {
            let dataset = session.dataset().ok_or(SmartFilterError::NoDataset)?;
            PrettyPrinter::print_chart(bar_chart(&dataset.rows, &dataset.headers).as_ref());
            Ok(())
        }
        ShellInput::Export { path, force } => {
            let path = match path {
                Some(path) => path,
                None => default_export_path(session)?,
            };
            let options = ExportOptions {
                force,
                ..export_defaults.clone()
            };
            let written = session.export(&path, &options)?;
            println!("📤 Wrote {written} rows to {}", path.display());
            Ok(())
        }
        ShellInput::Load(path) => {
            session.unload()?;
            let spinner = Spinner::new("Loading file...");
            let dataset = session.load_file(&path).await?;
            drop(spinner);
            PrettyPrinter::print_dataset_summary(dataset);
            Ok(())
        }
        ShellInput::Empty | ShellInput::Quit => Ok(()),
        ShellInput::Invalid(message) => {
            println!("{message}");
            Ok(())
        }
    }
}

/// `<file>_filtered.xlsx` in the working directory
fn default_export_path(session: &Session) -> Result<PathBuf> {
    let dataset = session.dataset().ok_or(SmartFilterError::NoDataset)?;
    Ok(PathBuf::from(suggested_export_name(
        &dataset.source_name,
        ExportFormat::default(),
    )))
}

fn history_entry(session: &Session, position: usize) -> Result<uuid::Uuid> {
    session
        .history()
        .get_index(position - 1)
        .map(|entry| entry.view_id)
        .ok_or_else(|| {
            SmartFilterError::invalid_input(format!(
                "There is no history entry {position} ({} entries)",
                session.history().len()
            ))
        })
}

async fn filter(
    session: &mut Session,
    requirement: &str,
    interrupts: &mut UnboundedReceiver<()>,
) -> Result<()> {
    let spinner = Spinner::new("Analyzing requirements...");
    let outcome = tokio::select! {
        biased;
        Some(()) = interrupts.recv() => None,
        result = session.apply_filter(requirement) => Some(result),
    };
    drop(spinner);

    match outcome {
        Some(result) => {
            let stats = result?;
            PrettyPrinter::print_filter_outcome(session.explanation(), &stats);
            if let Some(dataset) = session.dataset() {
                PrettyPrinter::print_view(dataset, DEFAULT_ROWS);
            }
            Ok(())
        }
        None => {
            session.cancel_filter();
            println!("Cancelled.");
            Ok(())
        }
    }
}
