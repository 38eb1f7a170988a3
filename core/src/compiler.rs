//! Natural language to predicate compilation via a language model

use crate::config::{Config, ProjectionDefault};
use crate::data::Row;
use crate::error::{Result, SmartFilterError};
use crate::model::{prompt, LanguageModel, ModelRequest, ModelResponse};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on sample records sent with a request
pub const MAX_SAMPLE_ROWS: usize = 10;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const BACKEND_FAILURE_MESSAGE: &str =
    "AI analysis failed. Please try a simpler request or check your column names.";

/// A successfully compiled filter, before it is run
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Predicate source in the sandbox language
    pub code: String,
    /// Requested columns as the model named them; may be empty
    pub columns: Vec<String>,
    pub explanation: String,
}

pub struct PredicateCompiler {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    projection: ProjectionDefault,
    sample_limit: usize,
}

impl PredicateCompiler {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            timeout: DEFAULT_TIMEOUT,
            projection: ProjectionDefault::default(),
            sample_limit: MAX_SAMPLE_ROWS,
        }
    }

    pub fn from_config(model: Arc<dyn LanguageModel>, config: &Config) -> Self {
        Self::new(model)
            .with_timeout(Duration::from_secs(config.model.timeout_secs))
            .with_projection(config.filter.projection)
            .with_sample_limit(config.filter.sample_rows)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionDefault) -> Self {
        self.projection = projection;
        self
    }

    /// Values above [`MAX_SAMPLE_ROWS`] are clamped
    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit.min(MAX_SAMPLE_ROWS);
        self
    }

    pub fn sample_limit(&self) -> usize {
        self.sample_limit
    }

    pub fn build_request(&self, requirement: &str, headers: &[String], sample_rows: &[Row]) -> ModelRequest {
        let samples = &sample_rows[..sample_rows.len().min(self.sample_limit)];
        ModelRequest {
            requirement: requirement.to_string(),
            system_instruction: prompt::system_instruction(headers, samples, self.projection),
            user_message: prompt::user_message(requirement),
            response_schema: prompt::response_schema(),
        }
    }

    /// Ask the model for a predicate satisfying `requirement`.
    ///
    /// Transport failures, malformed answers and timeouts all surface as
    /// [`SmartFilterError::CompilerUnavailable`]; the underlying cause is
    /// logged only.
    pub async fn compile(
        &self,
        requirement: &str,
        headers: &[String],
        sample_rows: &[Row],
    ) -> Result<CompiledFilter> {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            return Err(SmartFilterError::invalid_input("Requirement must not be empty"));
        }

        let request = self.build_request(requirement, headers, sample_rows);
        info!("Compiling requirement with {}: {requirement}", self.model.name());

        let response = match tokio::time::timeout(self.timeout, self.model.generate(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Language model request failed: {e:#}");
                return Err(SmartFilterError::compiler_unavailable(BACKEND_FAILURE_MESSAGE));
            }
            Err(_) => {
                warn!("Language model request timed out after {:?}", self.timeout);
                return Err(SmartFilterError::compiler_unavailable(format!(
                    "The AI service did not answer within {} seconds. Please try again.",
                    self.timeout.as_secs()
                )));
            }
        };

        let compiled = interpret_response(response)?;
        debug!("Compiled predicate: {}", compiled.code);
        Ok(compiled)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Enforce the response contract: a reported error wins, otherwise both code
/// and explanation must be present
pub fn interpret_response(response: ModelResponse) -> Result<CompiledFilter> {
    if let Some(message) = non_blank(response.error) {
        info!("Model declined the requirement: {message}");
        return Err(SmartFilterError::unsatisfiable(message));
    }

    let (Some(code), Some(explanation)) = (non_blank(response.code), non_blank(response.explanation)) else {
        warn!("Model response is missing code or explanation");
        return Err(SmartFilterError::compiler_unavailable(
            "The AI service returned an incomplete answer. Please try again.",
        ));
    };

    Ok(CompiledFilter {
        code,
        columns: response.columns.unwrap_or_default(),
        explanation,
    })
}
