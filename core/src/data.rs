//! Tabular dataset model: cells, rows, and immutable-origin views

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A single scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Cell {
    Bool(bool),
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Whether the cell holds a number or text that starts with a parseable number
    pub fn is_numeric(&self) -> bool {
        match self {
            Cell::Number(_) => true,
            Cell::Text(s) => !crate::predicate::parse_float(s).is_nan(),
            _ => false,
        }
    }

    /// Numeric reading of the cell, following `parseFloat` semantics for text
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => crate::predicate::parse_float(s),
            _ => f64::NAN,
        };
        if n.is_nan() {
            None
        } else {
            Some(n)
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Number(n) => write!(f, "{}", crate::predicate::format_number(*n)),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Empty => Ok(()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

/// One record, keyed by column name in column order
pub type Row = IndexMap<String, Cell>;

/// Parsed headers and rows as produced by ingestion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }
}

/// Union of the keys of all rows, in order of first appearance
pub fn derive_headers(rows: &[Row]) -> Vec<String> {
    let mut headers: IndexMap<&str, ()> = IndexMap::new();
    for row in rows {
        for key in row.keys() {
            headers.entry(key.as_str()).or_insert(());
        }
    }
    headers.into_keys().map(str::to_string).collect()
}

/// A view over a loaded spreadsheet.
///
/// `original_rows` is shared by every view derived from the same load and is
/// never mutated; filters always re-run against it.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: Uuid,
    pub view_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub produced_at: DateTime<Utc>,
    pub source_name: String,
    pub source_headers: Arc<Vec<String>>,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub original_rows: Arc<Vec<Row>>,
    pub query: Option<String>,
}

impl Dataset {
    /// Build the initial view of a freshly parsed table
    pub fn new<S: Into<String>>(source_name: S, table: Table) -> Self {
        let Table { headers, rows } = table;
        let source_headers = if rows.is_empty() {
            Vec::new()
        } else {
            let derived = derive_headers(&rows);
            let mut merged: IndexMap<String, ()> = headers
                .into_iter()
                .filter(|h| derived.contains(h))
                .map(|h| (h, ()))
                .collect();
            for key in derived {
                merged.entry(key).or_insert(());
            }
            merged.into_keys().collect()
        };

        let now = Utc::now();
        let original_rows = Arc::new(rows);
        Self {
            id: Uuid::new_v4(),
            view_id: Uuid::new_v4(),
            created_at: now,
            produced_at: now,
            source_name: source_name.into(),
            headers: source_headers.clone(),
            source_headers: Arc::new(source_headers),
            rows: original_rows.as_ref().clone(),
            original_rows,
            query: None,
        }
    }

    /// Build a dataset straight from rows, deriving headers from their keys
    pub fn from_rows<S: Into<String>>(source_name: S, rows: Vec<Row>) -> Self {
        let headers = derive_headers(&rows);
        Self::new(source_name, Table::new(headers, rows))
    }

    /// Derive a new view that shares this dataset's identity and origin
    pub fn derive_view(&self, headers: Vec<String>, rows: Vec<Row>, query: Option<String>) -> Self {
        Self {
            id: self.id,
            view_id: Uuid::new_v4(),
            created_at: self.created_at,
            produced_at: Utc::now(),
            source_name: self.source_name.clone(),
            source_headers: Arc::clone(&self.source_headers),
            headers,
            rows,
            original_rows: Arc::clone(&self.original_rows),
            query,
        }
    }

    /// Leading rows of the original data, used as type hints for the compiler
    pub fn sample_rows(&self, limit: usize) -> &[Row] {
        let end = limit.min(self.original_rows.len());
        &self.original_rows[..end]
    }

    /// Current rows projected onto the visible headers
    pub fn visible_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|row| project_row(row, &self.headers))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn original_row_count(&self) -> usize {
        self.original_rows.len()
    }

    pub fn is_filtered(&self) -> bool {
        self.query.is_some()
    }

    /// Whether two datasets show the same view, ignoring view identity and timestamps
    pub fn same_view(&self, other: &Dataset) -> bool {
        self.id == other.id
            && self.source_name == other.source_name
            && self.headers == other.headers
            && self.rows == other.rows
            && self.query == other.query
            && Arc::ptr_eq(&self.original_rows, &other.original_rows)
    }
}

/// Keep only the given columns of a row, in header order
pub fn project_row(row: &Row, headers: &[String]) -> Row {
    headers
        .iter()
        .map(|h| (h.clone(), row.get(h).cloned().unwrap_or_default()))
        .collect()
}
