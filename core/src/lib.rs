//! # smartfilter-core
//!
//! Core library for smartfilter - natural-language filtering of spreadsheet data.
//! A requirement such as "price over 100, show name and price" is compiled by a
//! language model into a predicate in a restricted expression language, which is
//! then run row by row in a sandbox against the loaded data.
//!
//! This crate provides the functionality shared by the different interfaces
//! (the CLI and its interactive shell).

pub mod chart;
pub mod compiler;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod predicate;
pub mod projection;
pub mod session;
pub mod view;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

// Re-export the most commonly used types for convenience
pub use compiler::{CompiledFilter, PredicateCompiler};
pub use config::Config;
pub use data::{Cell, Dataset, Row, Table};
pub use error::{Result, SmartFilterError};
pub use export::{ExportFormat, ExportOptions};
pub use model::{LanguageModel, ModelRequest, ModelResponse};
pub use session::{Session, SessionStatus};
pub use view::{AppliedFilter, FilterEngine, FilterStats, History};
