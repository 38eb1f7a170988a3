//! Interactive session state: the active view, its history and the filter lifecycle

use crate::compiler::PredicateCompiler;
use crate::config::Config;
use crate::data::Dataset;
use crate::error::{Result, SmartFilterError, FILE_PARSE_MESSAGE};
use crate::export::{self, ExportOptions};
use crate::ingest;
use crate::model::LanguageModel;
use crate::view::{self, AppliedFilter, FilterEngine, FilterStats, History};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Idle,
    LoadingFile,
    Ready,
    ProcessingFilter,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::LoadingFile => "loading file",
            SessionStatus::Ready => "ready",
            SessionStatus::ProcessingFilter => "processing filter",
            SessionStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// A filter request that has been admitted but not yet completed.
///
/// Holds its own copy of the base view so the request is a pure function of
/// the view it started from.
#[derive(Debug)]
pub struct PendingFilter {
    ticket: u64,
    base: Dataset,
    requirement: String,
}

impl PendingFilter {
    pub fn base(&self) -> &Dataset {
        &self.base
    }

    pub fn requirement(&self) -> &str {
        &self.requirement
    }
}

pub struct Session {
    engine: FilterEngine,
    dataset: Option<Dataset>,
    history: History,
    status: SessionStatus,
    explanation: Option<String>,
    last_error: Option<String>,
    last_stats: Option<FilterStats>,
    in_flight: Option<u64>,
    next_ticket: u64,
}

impl Session {
    pub fn new(engine: FilterEngine, history_limit: usize) -> Self {
        Self {
            engine,
            dataset: None,
            history: History::new(history_limit),
            status: SessionStatus::Idle,
            explanation: None,
            last_error: None,
            last_stats: None,
            in_flight: None,
            next_ticket: 0,
        }
    }

    pub fn from_config(model: Arc<dyn LanguageModel>, config: &Config) -> Self {
        let compiler = PredicateCompiler::from_config(model, config);
        Self::new(FilterEngine::new(compiler), config.filter.history_limit)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn engine(&self) -> &FilterEngine {
        &self.engine
    }

    /// Explanation of the filter that produced the active view
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_stats(&self) -> Option<FilterStats> {
        self.last_stats
    }

    /// A filter ran successfully and kept no rows
    pub fn has_no_matches(&self) -> bool {
        self.dataset
            .as_ref()
            .is_some_and(|d| d.is_filtered() && d.rows.is_empty())
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.status {
            SessionStatus::LoadingFile | SessionStatus::ProcessingFilter => Err(SmartFilterError::Busy),
            _ => Ok(()),
        }
    }

    fn settle_status(&mut self) {
        self.status = if self.dataset.is_some() {
            SessionStatus::Ready
        } else {
            SessionStatus::Idle
        };
    }

    /// Load a spreadsheet and make it the active view.
    ///
    /// On failure the session holds no dataset and reports a generic parse
    /// message; the history is kept either way.
    pub async fn load_file(&mut self, path: &Path) -> Result<&Dataset> {
        self.ensure_idle()?;
        self.status = SessionStatus::LoadingFile;
        self.explanation = None;
        self.last_error = None;
        self.last_stats = None;

        match ingest::load_table_async(path.to_path_buf()).await {
            Ok(table) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                let dataset = Dataset::new(name, table);
                info!(
                    "Loaded {} ({} rows, {} columns)",
                    dataset.source_name,
                    dataset.row_count(),
                    dataset.column_count()
                );
                self.status = SessionStatus::Ready;
                Ok(&*self.dataset.insert(dataset))
            }
            Err(e) => {
                warn!("Failed to load {}: {e}", path.display());
                self.dataset = None;
                self.status = SessionStatus::Error;
                self.last_error = Some(FILE_PARSE_MESSAGE.to_string());
                Err(e)
            }
        }
    }

    /// Admit a filter request against the active view
    pub fn begin_filter(&mut self, requirement: &str) -> Result<PendingFilter> {
        self.ensure_idle()?;
        let base = self.dataset.clone().ok_or(SmartFilterError::NoDataset)?;
        let requirement = requirement.trim();
        if requirement.is_empty() {
            return Err(SmartFilterError::invalid_input("Requirement must not be empty"));
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight = Some(ticket);
        self.status = SessionStatus::ProcessingFilter;
        self.last_error = None;
        debug!("Filter #{ticket} started: {requirement}");

        Ok(PendingFilter {
            ticket,
            base,
            requirement: requirement.to_string(),
        })
    }

    /// Complete a filter request.
    ///
    /// On success the new view replaces the active one and is recorded in the
    /// history. On failure the active view is kept and the error recorded.
    /// Results of cancelled requests are discarded.
    pub fn finish_filter(
        &mut self,
        pending: PendingFilter,
        result: Result<AppliedFilter>,
    ) -> Result<FilterStats> {
        if self.in_flight != Some(pending.ticket) {
            debug!("Discarding result of cancelled filter #{}", pending.ticket);
            return Err(SmartFilterError::invalid_input("The filter request was cancelled"));
        }
        self.in_flight = None;

        match result {
            Ok(applied) => {
                self.history.record(applied.dataset.clone());
                self.dataset = Some(applied.dataset);
                self.explanation = Some(applied.explanation);
                self.last_stats = Some(applied.stats);
                self.status = SessionStatus::Ready;
                Ok(applied.stats)
            }
            Err(e) => {
                self.explanation = None;
                self.last_error = Some(e.user_message());
                self.settle_status();
                Err(e)
            }
        }
    }

    /// Abandon the in-flight filter, if any.
    ///
    /// Also settles a [`Session::load_file`] whose future was dropped, so the
    /// session does not stay busy.
    pub fn cancel_filter(&mut self) {
        if let Some(ticket) = self.in_flight.take() {
            info!("Filter #{ticket} cancelled");
            self.settle_status();
        } else if self.status == SessionStatus::LoadingFile {
            info!("File load cancelled");
            self.settle_status();
        }
    }

    /// Compile and apply `requirement` to the active view.
    ///
    /// Dropping the returned future leaves the session processing; call
    /// [`Session::cancel_filter`] afterwards.
    pub async fn apply_filter(&mut self, requirement: &str) -> Result<FilterStats> {
        let pending = self.begin_filter(requirement)?;
        let result = self
            .engine
            .apply_filter(&pending.base, &pending.requirement)
            .await;
        self.finish_filter(pending, result)
    }

    /// Show every row and column of the load again
    pub fn reset(&mut self) -> Result<&Dataset> {
        self.ensure_idle()?;
        let current = self.dataset.as_ref().ok_or(SmartFilterError::NoDataset)?;
        let restored = view::reset(current);
        self.explanation = None;
        self.last_error = None;
        self.last_stats = None;
        self.status = SessionStatus::Ready;
        Ok(&*self.dataset.insert(restored))
    }

    /// Make a history entry the active view without recording it again
    pub fn select_history(&mut self, view_id: Uuid) -> Result<&Dataset> {
        self.ensure_idle()?;
        let entry = self
            .history
            .get(view_id)
            .cloned()
            .ok_or(SmartFilterError::HistoryEntryNotFound { view_id })?;
        self.explanation = None;
        self.last_error = None;
        self.last_stats = None;
        self.status = SessionStatus::Ready;
        Ok(&*self.dataset.insert(entry))
    }

    /// Returns whether an entry was removed
    pub fn remove_history(&mut self, view_id: Uuid) -> bool {
        self.history.remove(view_id).is_some()
    }

    /// Drop the active dataset so another file can be loaded; history is kept
    pub fn unload(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.dataset = None;
        self.explanation = None;
        self.last_error = None;
        self.last_stats = None;
        self.status = SessionStatus::Idle;
        Ok(())
    }

    /// Write the active view to `path`
    pub fn export(&self, path: &Path, options: &ExportOptions) -> Result<usize> {
        let dataset = self.dataset.as_ref().ok_or(SmartFilterError::NoDataset)?;
        export::export_view(dataset, path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{error_response, filter_response, ScriptedModel};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(model: ScriptedModel) -> Session {
        Session::new(FilterEngine::new(PredicateCompiler::new(Arc::new(model))), 10)
    }

    fn write_csv(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("products.csv");
        fs::write(&path, "Name,Price\nA,50\nB,150\nC,200\n").unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_and_filter() {
        let dir = TempDir::new().unwrap();
        let mut session = session(ScriptedModel::new().respond(filter_response(
            "return row.Price > 100;",
            &["Name"],
            "Above 100",
        )));
        assert_eq!(session.status(), SessionStatus::Idle);

        session.load_file(&write_csv(&dir)).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.dataset().unwrap().source_name, "products.csv");

        let stats = session.apply_filter("price over 100").await.unwrap();
        assert_eq!(stats.matched, 2);
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.explanation(), Some("Above 100"));
        assert_eq!(session.dataset().unwrap().headers, vec!["Name".to_string()]);
        assert_eq!(session.history().len(), 1);
        assert!(!session.has_no_matches());
    }

    #[tokio::test]
    async fn test_bad_file_clears_dataset() {
        let dir = TempDir::new().unwrap();
        let mut session = session(ScriptedModel::new());
        session.load_file(&write_csv(&dir)).await.unwrap();

        let bad = dir.path().join("broken.xlsx");
        fs::write(&bad, "not a workbook").unwrap();
        assert!(session.load_file(&bad).await.is_err());
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.dataset().is_none());
        assert_eq!(session.last_error(), Some(FILE_PARSE_MESSAGE));
    }

    #[tokio::test]
    async fn test_filter_error_keeps_view() {
        let dir = TempDir::new().unwrap();
        let mut session = session(ScriptedModel::new().respond(error_response("No Colour column")));
        session.load_file(&write_csv(&dir)).await.unwrap();
        let before = session.dataset().unwrap().view_id;

        let err = session.apply_filter("red ones").await.unwrap_err();
        assert!(err.is_filter_error());
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.last_error(), Some("No Colour column"));
        assert_eq!(session.explanation(), None);
        assert_eq!(session.dataset().unwrap().view_id, before);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_busy_while_processing_and_cancel() {
        let dir = TempDir::new().unwrap();
        let mut session = session(ScriptedModel::new());
        session.load_file(&write_csv(&dir)).await.unwrap();

        let pending = session.begin_filter("anything").unwrap();
        assert_eq!(session.status(), SessionStatus::ProcessingFilter);
        assert!(matches!(session.begin_filter("again"), Err(SmartFilterError::Busy)));
        assert!(matches!(session.reset(), Err(SmartFilterError::Busy)));

        session.cancel_filter();
        assert_eq!(session.status(), SessionStatus::Ready);

        // A late result of the cancelled request is discarded
        let late = pending.base().derive_view(Vec::new(), Vec::new(), Some("late".to_string()));
        let result = Ok(AppliedFilter {
            dataset: late,
            explanation: "late".to_string(),
            code: "return true;".to_string(),
            stats: FilterStats::default(),
        });
        assert!(session.finish_filter(pending, result).is_err());
        assert!(!session.dataset().unwrap().is_filtered());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_futures_can_be_cancelled() {
        let dir = TempDir::new().unwrap();
        let model = ScriptedModel::new()
            .respond(filter_response("return true;", &[], "All"))
            .with_delay(Duration::from_secs(60));
        let mut session = session(model);
        session.load_file(&write_csv(&dir)).await.unwrap();

        let dropped = tokio::time::timeout(Duration::from_millis(20), session.apply_filter("all")).await;
        assert!(dropped.is_err());
        assert_eq!(session.status(), SessionStatus::ProcessingFilter);
        session.cancel_filter();
        assert_eq!(session.status(), SessionStatus::Ready);

        // A load whose future was dropped leaves the session loading until cancelled
        session.status = SessionStatus::LoadingFile;
        assert!(matches!(session.reset(), Err(SmartFilterError::Busy)));
        session.cancel_filter();
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.dataset().unwrap().row_count(), 3);

        session.unload().unwrap();
        session.status = SessionStatus::LoadingFile;
        session.cancel_filter();
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_begin_filter_rejections() {
        let dir = TempDir::new().unwrap();
        let mut session = session(ScriptedModel::new());
        assert!(matches!(session.begin_filter("x"), Err(SmartFilterError::NoDataset)));

        session.load_file(&write_csv(&dir)).await.unwrap();
        assert!(matches!(session.begin_filter("  "), Err(SmartFilterError::InvalidInput(_))));
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_zero_matches_reset_and_history() {
        let dir = TempDir::new().unwrap();
        let mut session = session(
            ScriptedModel::new()
                .respond(filter_response("return false;", &[], "Nothing"))
                .respond(filter_response("return row.Name === 'A';", &[], "Only A")),
        );
        session.load_file(&write_csv(&dir)).await.unwrap();

        session.apply_filter("nothing").await.unwrap();
        assert!(session.has_no_matches());
        let empty_view = session.dataset().unwrap().view_id;

        session.apply_filter("only a").await.unwrap();
        assert_eq!(session.history().len(), 2);

        session.select_history(empty_view).unwrap();
        assert!(session.has_no_matches());
        assert_eq!(session.dataset().unwrap().query.as_deref(), Some("nothing"));
        assert_eq!(session.history().len(), 2);

        let restored = session.reset().unwrap();
        assert_eq!(restored.row_count(), 3);
        assert!(!restored.is_filtered());
        assert_eq!(session.explanation(), None);

        assert!(matches!(
            session.select_history(Uuid::new_v4()),
            Err(SmartFilterError::HistoryEntryNotFound { .. })
        ));
        assert!(session.remove_history(empty_view));
        assert!(!session.remove_history(empty_view));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_unload_keeps_history_and_export() {
        let dir = TempDir::new().unwrap();
        let mut session = session(ScriptedModel::new().respond(filter_response(
            "return row.Price >= 150;",
            &["Price"],
            "Expensive",
        )));
        session.load_file(&write_csv(&dir)).await.unwrap();
        session.apply_filter("expensive").await.unwrap();

        let out = dir.path().join("out.csv");
        assert_eq!(session.export(&out, &ExportOptions::default()).unwrap(), 2);
        assert_eq!(fs::read_to_string(&out).unwrap(), "Price\n150\n200\n");

        session.unload().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.dataset().is_none());
        assert_eq!(session.history().len(), 1);
        assert!(matches!(
            session.export(&out, &ExportOptions::default()),
            Err(SmartFilterError::NoDataset)
        ));
    }
}
