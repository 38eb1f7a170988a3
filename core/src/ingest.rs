//! Reading spreadsheets and delimited files into a [`Table`]

use crate::data::{derive_headers, Cell, Row, Table};
use crate::error::{Result, SmartFilterError};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use indexmap::IndexMap;
use log::{debug, info};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Tsv,
    /// Plain text, delimiter sniffed from the first line
    Text,
    Spreadsheet,
    Json,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" | "tab" => Ok(Self::Tsv),
            "txt" => Ok(Self::Text),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Spreadsheet),
            "json" => Ok(Self::Json),
            "" => Err(SmartFilterError::file_parse(path, "file has no extension")),
            other => Err(SmartFilterError::file_parse(
                path,
                format!("unsupported file type '.{other}'"),
            )),
        }
    }
}

/// Parse the file at `path`. Only the first worksheet of a workbook is read.
pub fn load_table(path: &Path) -> Result<Table> {
    let format = InputFormat::from_path(path)?;
    debug!("Reading {} as {format:?}", path.display());

    let table = match format {
        InputFormat::Csv => build_table(read_delimited(path, b',')?),
        InputFormat::Tsv => build_table(read_delimited(path, b'\t')?),
        InputFormat::Text => build_table(read_delimited(path, sniff_delimiter(path)?)?),
        InputFormat::Spreadsheet => build_table(read_spreadsheet(path)?),
        InputFormat::Json => read_json(path)?,
    };

    info!(
        "Loaded {} rows and {} columns from {}",
        table.rows.len(),
        table.headers.len(),
        path.display()
    );
    Ok(table)
}

/// [`load_table`] on the blocking thread pool
pub async fn load_table_async(path: PathBuf) -> Result<Table> {
    let display = path.clone();
    tokio::task::spawn_blocking(move || load_table(&path))
        .await
        .map_err(|e| SmartFilterError::file_parse(display, format!("reader task failed: {e}")))?
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> SmartFilterError {
    SmartFilterError::file_parse(path, err.to_string())
}

fn sniff_delimiter(path: &Path) -> Result<u8> {
    let content = std::fs::read(path).map_err(|e| parse_error(path, e))?;
    let first_line = content.split(|b| *b == b'\n').next().unwrap_or_default();
    Ok(if first_line.contains(&b'\t') { b'\t' } else { b',' })
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Vec<Vec<Cell>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| parse_error(path, e))?;

    let mut grid = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| parse_error(path, e))?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    let text = String::from_utf8_lossy(field);
                    if text.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(text.into_owned())
                    }
                })
                .collect(),
        );
    }
    Ok(grid)
}

fn read_spreadsheet(path: &Path) -> Result<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| parse_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SmartFilterError::file_parse(path, "workbook has no worksheets"))?
        .map_err(|e| parse_error(path, e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTime(_) => match data.as_datetime() {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => {
                Cell::Text(dt.format("%Y-%m-%d").to_string())
            }
            Some(dt) => Cell::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => Cell::Text(data.to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
        Data::Empty => Cell::Empty,
    }
}

fn read_json(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|e| parse_error(path, e))?;
    let records: Vec<IndexMap<String, serde_json::Value>> =
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| parse_error(path, format!("expected an array of objects: {e}")))?;

    let rows: Vec<Row> = records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|(key, value)| (key, cell_from_json(value)))
                .collect()
        })
        .collect();
    let headers = derive_headers(&rows);
    let rows = rows
        .into_iter()
        .map(|mut row| {
            headers
                .iter()
                .map(|h| (h.clone(), row.swap_remove(h).unwrap_or_default()))
                .collect()
        })
        .collect();
    Ok(Table::new(headers, rows))
}

fn cell_from_json(value: serde_json::Value) -> Cell {
    match value {
        serde_json::Value::Null => Cell::Empty,
        serde_json::Value::Bool(b) => Cell::Bool(b),
        serde_json::Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or_default(),
        serde_json::Value::String(s) if s.is_empty() => Cell::Empty,
        serde_json::Value::String(s) => Cell::Text(s),
        nested => Cell::Text(nested.to_string()),
    }
}

/// Turn a raw grid whose first row is the header row into a table.
///
/// Blank header cells become `column_N`, repeated names get `_1`, `_2`
/// suffixes, short rows are padded with empty cells and fully blank rows
/// are skipped.
pub fn build_table(grid: Vec<Vec<Cell>>) -> Table {
    let mut grid = grid.into_iter();
    let Some(header_row) = grid.next() else {
        return Table::default();
    };
    let data: Vec<Vec<Cell>> = grid.filter(|row| row.iter().any(|c| !c.is_empty())).collect();
    if data.is_empty() {
        return Table::default();
    }

    let width = data
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header_row.len()))
        .max()
        .unwrap_or(0);
    let raw_headers: Vec<String> = (0..width)
        .map(|i| {
            header_row
                .get(i)
                .map(|c| c.to_string().trim_start_matches('\u{feff}').trim().to_string())
                .unwrap_or_default()
        })
        .collect();
    let headers = unique_headers(raw_headers);

    let rows = data
        .into_iter()
        .map(|cells| {
            let mut cells = cells.into_iter();
            headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                .collect()
        })
        .collect();
    Table::new(headers, rows)
}

fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let named: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(i, name)| if name.is_empty() { format!("column_{}", i + 1) } else { name })
        .collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(named.len());
    for name in named {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        taken.insert(candidate.clone());
        headers.push(candidate);
    }
    headers
}
