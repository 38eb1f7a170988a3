use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ModelConfig, ModelProvider};

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiModel;

/// Everything a backend needs for one compile round trip
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    /// The user's requirement, as typed
    pub requirement: String,
    pub system_instruction: String,
    pub user_message: String,
    pub response_schema: serde_json::Value,
}

/// Structured answer from the model; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logging
    fn name(&self) -> &str;

    /// Send the request and parse the structured reply
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

/// Build the configured language model backend
pub fn from_config(config: &ModelConfig) -> crate::Result<Arc<dyn LanguageModel>> {
    match config.provider {
        ModelProvider::Gemini => Ok(Arc::new(GeminiModel::from_config(config)?)),
    }
}
