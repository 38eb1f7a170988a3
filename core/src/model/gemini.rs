use super::{LanguageModel, ModelRequest, ModelResponse};
use crate::config::ModelConfig;
use crate::error::SmartFilterError;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;

/// Key variables tried in order when the config names none
const DEFAULT_KEY_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY"];

/// Google Gemini `generateContent` backend
pub struct GeminiModel {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiModel {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> crate::Result<Self> {
        let candidates: Vec<&str> = match &config.api_key_env {
            Some(name) => vec![name.as_str()],
            None => DEFAULT_KEY_VARS.to_vec(),
        };
        let api_key = candidates
            .iter()
            .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                SmartFilterError::config(format!(
                    "No Gemini API key found; set {}",
                    candidates.join(" or ")
                ))
            })?;
        log::debug!("Using Gemini model {} at {}", config.name, config.endpoint);
        Ok(Self::new(&config.endpoint, &config.name, api_key)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    /// Socket-level timeout; the compiler enforces its own deadline on top
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::AgentBuilder::new().timeout(timeout).build();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

fn request_body(request: &ModelRequest) -> serde_json::Value {
    json!({
        "systemInstruction": {
            "parts": [{ "text": request.system_instruction }]
        },
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.user_message }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.response_schema
        }
    })
}

/// Pull the JSON answer out of a `generateContent` payload
fn parse_payload(payload: &str) -> Result<ModelResponse> {
    let response: GenerateContentResponse =
        serde_json::from_str(payload).context("Unexpected generateContent payload")?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        bail!("Request was blocked by the model: {reason}");
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Model returned no candidates"))?;
    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        bail!(
            "Model returned an empty answer (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        );
    }

    let text = text.trim();
    let json_text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(text);
    serde_json::from_str(json_text.trim()).context("Model answer is not the expected JSON object")
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        log::debug!("Sending requirement to {}: {}", self.model, request.requirement);

        let agent = self.agent.clone();
        let url = self.url();
        let api_key = self.api_key.clone();
        let body = request_body(request);

        // ureq blocks; a dropped request leaves the worker to finish and discard
        let payload = tokio::task::spawn_blocking(move || post(&agent, &url, &api_key, &body))
            .await
            .context("Gemini request task failed")??;

        parse_payload(&payload)
    }
}

fn post(agent: &ureq::Agent, url: &str, api_key: &str, body: &serde_json::Value) -> Result<String> {
    match agent.post(url).set("x-goog-api-key", api_key).send_json(body) {
        Ok(response) => response
            .into_string()
            .context("Failed to read the Gemini response"),
        Err(ureq::Error::Status(status, response)) => {
            let detail = response.into_string().unwrap_or_default();
            bail!("Gemini API returned {status}: {detail}")
        }
        Err(e) => Err(anyhow!("Failed to reach the Gemini API: {e}")),
    }
}
