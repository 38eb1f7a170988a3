//! Error types for smartfilter

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Message shown when generated filter logic cannot be compiled
pub const REPHRASE_MESSAGE: &str =
    "Smart Filter generated invalid logic. Try rephrasing your request.";

/// Message shown when an uploaded file cannot be interpreted
pub const FILE_PARSE_MESSAGE: &str =
    "Failed to parse the file. Please use a valid Excel or CSV document.";

pub type Result<T> = std::result::Result<T, SmartFilterError>;

#[derive(Error, Debug)]
pub enum SmartFilterError {
    #[error("{} ({}: {message})", FILE_PARSE_MESSAGE, .path.display())]
    FileParse { path: PathBuf, message: String },

    #[error("{message}")]
    CompilerUnavailable { message: String },

    #[error("{0}")]
    UnsatisfiableRequirement(String),

    #[error("{} ({message})", REPHRASE_MESSAGE)]
    InvalidPredicateSyntax { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No dataset loaded. Load a spreadsheet first.")]
    NoDataset,

    #[error("A filter request is already being processed")]
    Busy,

    #[error("History entry not found: {view_id}")]
    HistoryEntryNotFound { view_id: Uuid },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SmartFilterError {
    pub fn file_parse<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::FileParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn compiler_unavailable<S: Into<String>>(message: S) -> Self {
        Self::CompilerUnavailable {
            message: message.into(),
        }
    }

    pub fn unsatisfiable<S: Into<String>>(message: S) -> Self {
        Self::UnsatisfiableRequirement(message.into())
    }

    pub fn invalid_predicate<S: Into<String>>(message: S) -> Self {
        Self::InvalidPredicateSyntax {
            message: message.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn export<S: Into<String>>(message: S) -> Self {
        Self::Export(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CompilerUnavailable { .. })
    }

    /// Whether this error came out of the filter pipeline (the active view is kept)
    pub fn is_filter_error(&self) -> bool {
        matches!(
            self,
            Self::CompilerUnavailable { .. }
                | Self::UnsatisfiableRequirement(_)
                | Self::InvalidPredicateSyntax { .. }
        )
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::FileParse { .. } => FILE_PARSE_MESSAGE.to_string(),
            Self::InvalidPredicateSyntax { .. } => REPHRASE_MESSAGE.to_string(),
            Self::UnsatisfiableRequirement(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<toml::ser::Error> for SmartFilterError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}
