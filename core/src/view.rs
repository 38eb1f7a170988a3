//! Filter orchestration over a dataset and the bounded view history

use crate::compiler::PredicateCompiler;
use crate::data::Dataset;
use crate::error::{Result, SmartFilterError};
use crate::predicate::{self, compile_predicate, FilterRun};
use crate::projection;
use log::info;
use serde::Serialize;
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Counters from one predicate run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub evaluated: usize,
    pub matched: usize,
    pub faulted: usize,
    pub non_boolean: usize,
}

/// A new view produced by a natural-language filter
#[derive(Debug, Clone)]
pub struct AppliedFilter {
    pub dataset: Dataset,
    pub explanation: String,
    /// Predicate source that produced the view
    pub code: String,
    pub stats: FilterStats,
}

pub struct FilterEngine {
    compiler: PredicateCompiler,
}

impl FilterEngine {
    pub fn new(compiler: PredicateCompiler) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &PredicateCompiler {
        &self.compiler
    }

    /// Filter and re-project `base` according to `requirement`.
    ///
    /// Always works from the load's original rows and full header list, so
    /// applying a filter to an already filtered view does not compound. On
    /// error nothing is produced and `base` is untouched.
    pub async fn apply_filter(&self, base: &Dataset, requirement: &str) -> Result<AppliedFilter> {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            return Err(SmartFilterError::invalid_input("Requirement must not be empty"));
        }

        let samples = base.sample_rows(self.compiler.sample_limit());
        let compiled = self
            .compiler
            .compile(requirement, &base.source_headers, samples)
            .await?;

        let predicate = compile_predicate(&compiled.code)?;
        let FilterRun {
            rows,
            evaluated,
            faulted,
            non_boolean,
        } = predicate::apply(&predicate, &base.original_rows);

        let headers = projection::resolve(&compiled.columns, &base.source_headers);
        let stats = FilterStats {
            evaluated,
            matched: rows.len(),
            faulted,
            non_boolean,
        };
        info!(
            "Filter \"{requirement}\" kept {} of {} rows and {} of {} columns",
            stats.matched,
            stats.evaluated,
            headers.len(),
            base.source_headers.len()
        );

        Ok(AppliedFilter {
            dataset: base.derive_view(headers, rows, Some(requirement.to_string())),
            explanation: compiled.explanation,
            code: predicate.source().to_string(),
            stats,
        })
    }
}

/// Restore the full data and every column of the load
pub fn reset(base: &Dataset) -> Dataset {
    let headers = if base.source_headers.is_empty() {
        base.headers.clone()
    } else {
        base.source_headers.as_ref().clone()
    };
    base.derive_view(headers, base.original_rows.as_ref().clone(), None)
}

/// Most-recent-first list of produced views
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Dataset>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Prepend an entry, dropping the oldest beyond the limit
    pub fn record(&mut self, entry: Dataset) {
        self.entries.insert(0, entry);
        self.entries.truncate(self.limit);
    }

    /// Remove the entry with this view id; absent ids are ignored
    pub fn remove(&mut self, view_id: Uuid) -> Option<Dataset> {
        let index = self.entries.iter().position(|e| e.view_id == view_id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, view_id: Uuid) -> Option<&Dataset> {
        self.entries.iter().find(|e| e.view_id == view_id)
    }

    /// Entry by position, 0 being the most recent
    pub fn get_index(&self, index: usize) -> Option<&Dataset> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
