//! Output formatting utilities

use serde::Serialize;
use smartfilter_core::chart::BarChart;
use smartfilter_core::config::{Config, ConfigResolutionInfo};
use smartfilter_core::error::Result;
use smartfilter_core::{Dataset, FilterStats, History, Row};
use uuid::Uuid;

const MAX_CELL_WIDTH: usize = 30;
const MIN_COLUMN_WIDTH: usize = 6;
const CHART_WIDTH: usize = 40;

/// Pretty printer for smartfilter output
pub struct PrettyPrinter;

impl PrettyPrinter {
    pub fn print_dataset_summary(dataset: &Dataset) {
        println!("📄 {}", dataset.source_name);
        println!(
            "├─ Rows: {} of {}",
            dataset.row_count(),
            dataset.original_row_count()
        );
        println!(
            "├─ Columns: {} of {}",
            dataset.column_count(),
            dataset.source_headers.len()
        );
        match &dataset.query {
            Some(query) => println!("└─ Filter: {query}"),
            None => println!("└─ Filter: none"),
        }
    }

    pub fn print_view(dataset: &Dataset, limit: usize) {
        if dataset.headers.is_empty() {
            println!("(no columns)");
            return;
        }
        print!("{}", render_table(&dataset.headers, &dataset.rows, limit));
        if dataset.row_count() > limit {
            println!("… {} more rows", dataset.row_count() - limit);
        }
    }

    pub fn print_filter_outcome(explanation: Option<&str>, stats: &FilterStats) {
        if let Some(explanation) = explanation {
            println!("💡 {explanation}");
        }
        println!("✅ Kept {} of {} rows", stats.matched, stats.evaluated);
        if stats.faulted > 0 {
            println!("⚠️  {} rows could not be evaluated and were excluded", stats.faulted);
        }
        if stats.matched == 0 {
            println!("No rows match this requirement. Try loosening it or reset the view.");
        }
    }

    pub fn print_chart(chart: Option<&BarChart>) {
        match chart {
            Some(chart) => print!("{}", render_chart(chart)),
            None => println!("No numeric column to chart."),
        }
    }

    pub fn print_history(history: &History, active: Option<Uuid>) {
        if history.is_empty() {
            println!("No filters applied yet.");
            return;
        }

        println!("🕘 History (most recent first):");
        let count = history.len();
        for (i, entry) in history.iter().enumerate() {
            let prefix = if i == count - 1 { "└─" } else { "├─" };
            let marker = if Some(entry.view_id) == active { " *" } else { "" };
            println!(
                "{prefix} {}. {} [{} rows, {} columns] {}{marker}",
                i + 1,
                entry.query.as_deref().unwrap_or("(all data)"),
                entry.row_count(),
                entry.column_count(),
                entry.produced_at.format("%H:%M:%S"),
            );
        }
    }

    pub fn print_config(config: &Config, info: &ConfigResolutionInfo) -> Result<()> {
        println!("Configuration source: {}", info.config_source);
        if !info.config_paths.is_empty() {
            println!("Config files:");
            for path in &info.config_paths {
                println!("  {path}");
            }
        }
        println!("Resolution order:");
        for (i, step) in info.resolution_order.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
        println!();
        print!("{}", toml::to_string_pretty(config)?);
        Ok(())
    }
}

/// Machine-readable view of a dataset
#[derive(Debug, Serialize)]
pub struct ViewReport<'a> {
    pub source: &'a str,
    pub query: Option<&'a str>,
    pub explanation: Option<&'a str>,
    pub headers: &'a [String],
    pub row_count: usize,
    pub original_row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<FilterStats>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<BarChart>,
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format_view(
        dataset: &Dataset,
        limit: usize,
        explanation: Option<&str>,
        stats: Option<FilterStats>,
        chart: Option<BarChart>,
    ) -> Result<String> {
        let mut rows = dataset.visible_rows();
        rows.truncate(limit);
        let report = ViewReport {
            source: &dataset.source_name,
            query: dataset.query.as_deref(),
            explanation,
            headers: &dataset.headers,
            row_count: dataset.row_count(),
            original_row_count: dataset.original_row_count(),
            stats,
            rows,
            chart,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut cut: String = value.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

/// Render up to `limit` rows as an aligned text table
pub fn render_table(headers: &[String], rows: &[Row], limit: usize) -> String {
    let rows = &rows[..rows.len().min(limit)];
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| truncate(&row.get(h).map(|c| c.to_string()).unwrap_or_default(), MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers
        .iter()
        .map(|h| h.chars().count().min(MAX_CELL_WIDTH).max(MIN_COLUMN_WIDTH))
        .collect();
    for row in &cells {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let line = |values: Vec<String>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(value, &width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.iter().map(|h| truncate(h, MAX_CELL_WIDTH)).collect()));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|&width| "-".repeat(width))
            .collect::<Vec<_>>()
            .join("-|-"),
    );
    out.push('\n');
    for row in cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

/// Render a horizontal bar chart scaled to the largest value
pub fn render_chart(chart: &BarChart) -> String {
    let max = chart.max_value();
    let mut out = format!("📊 {} by {}\n", chart.y_key, chart.x_key);
    for bar in &chart.bars {
        let length = if max > 0.0 && bar.value > 0.0 {
            ((bar.value / max) * CHART_WIDTH as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:<10} {} {}\n",
            bar.label,
            "█".repeat(length),
            smartfilter_core::predicate::format_number(bar.value)
        ));
    }
    out
}
