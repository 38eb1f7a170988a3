//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use smartfilter_core::{
    Cell, FilterEngine, LanguageModel, ModelRequest, ModelResponse, PredicateCompiler, Row,
    Session,
};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Test fixture paths and utilities
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
    pub data_dir: PathBuf,
    pub configs_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");

        Self {
            data_dir: fixtures_dir.join("data"),
            configs_dir: fixtures_dir.join("configs"),
            fixtures_dir,
        }
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.configs_dir.join(name)
    }
}

/// Scratch directory for files a test writes
pub struct TestWorkspace {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().to_path_buf();
        Self { temp_dir, path }
    }

    /// Copy a test data file into the workspace
    pub fn copy_data_file(&self, data_file_name: &str, target_name: &str) -> PathBuf {
        let source = TestFixtures::new().data_file(data_file_name);
        let target = self.path.join(target_name);
        fs::copy(&source, &target).expect("Failed to copy data file");
        target
    }

    /// Write a file with the given contents into the workspace
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let target = self.path.join(name);
        fs::write(&target, contents).expect("Failed to write file");
        target
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Language model stand-in that answers from a queue of canned responses
#[derive(Default)]
pub struct CannedModel {
    replies: Mutex<VecDeque<anyhow::Result<ModelResponse>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl CannedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(self, code: &str, columns: &[&str], explanation: &str) -> Self {
        self.push(Ok(ModelResponse {
            code: Some(code.to_string()),
            columns: Some(columns.iter().map(|c| c.to_string()).collect()),
            explanation: Some(explanation.to_string()),
            error: None,
        }))
    }

    pub fn refuse(self, message: &str) -> Self {
        self.push(Ok(ModelResponse {
            error: Some(message.to_string()),
            ..Default::default()
        }))
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(Err(anyhow::anyhow!(message.to_string())))
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(self, reply: anyhow::Result<ModelResponse>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

#[async_trait]
impl LanguageModel for CannedModel {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: &ModelRequest) -> anyhow::Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no canned reply left")))
    }
}

pub fn engine(model: CannedModel) -> FilterEngine {
    FilterEngine::new(PredicateCompiler::new(Arc::new(model)))
}

pub fn session(model: CannedModel) -> Session {
    Session::new(engine(model), 10)
}

pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), Cell::from(*value)))
        .collect()
}

pub fn column<'a>(rows: &'a [Row], name: &str) -> Vec<&'a Cell> {
    rows.iter().map(|r| &r[name]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        let fixtures = TestFixtures::new();
        assert!(fixtures.fixtures_dir.exists());
        assert!(fixtures.data_file("products.csv").exists());
        assert!(fixtures.config_file("local.toml").exists());
    }

    #[test]
    fn test_workspace_creation() {
        let workspace = TestWorkspace::new();
        let data_file = workspace.copy_data_file("products.csv", "copy.csv");
        assert!(data_file.exists());
        assert!(workspace.path().exists());
    }
}
