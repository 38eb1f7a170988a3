//! Shared fixtures for unit tests and for downstream crates' tests

use crate::data::{Cell, Dataset, Row, Table};
use crate::model::{LanguageModel, ModelRequest, ModelResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

enum ScriptedReply {
    Respond(ModelResponse),
    Fail(String),
}

/// A language model that replays canned answers in order and records every request
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: ModelResponse) -> Self {
        self.push(ScriptedReply::Respond(response));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(ScriptedReply::Fail(message.to_string()));
        self
    }

    /// Delay every answer, for timeout and cancellation tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn push(&self, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> anyhow::Result<ModelResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match reply {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }
}

pub fn filter_response(code: &str, columns: &[&str], explanation: &str) -> ModelResponse {
    ModelResponse {
        code: Some(code.to_string()),
        columns: Some(columns.iter().map(|c| c.to_string()).collect()),
        explanation: Some(explanation.to_string()),
        error: None,
    }
}

pub fn error_response(message: &str) -> ModelResponse {
    ModelResponse {
        error: Some(message.to_string()),
        ..Default::default()
    }
}

pub fn row(pairs: &[(&str, Cell)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Five products with a numeric price column stored as mixed cells
pub fn products_table() -> Table {
    let headers = vec!["Name".to_string(), "Price".to_string(), "Category".to_string()];
    let rows = vec![
        row(&[("Name", "A".into()), ("Price", 50.0.into()), ("Category", "Tools".into())]),
        row(&[("Name", "B".into()), ("Price", 150.0.into()), ("Category", "Garden".into())]),
        row(&[("Name", "C".into()), ("Price", "200".into()), ("Category", "Tools".into())]),
        row(&[("Name", "D".into()), ("Price", "n/a".into()), ("Category", "Kitchen".into())]),
        row(&[("Name", "E".into()), ("Price", Cell::Empty), ("Category", "Garden".into())]),
    ];
    Table::new(headers, rows)
}

pub fn products_dataset() -> Dataset {
    Dataset::new("products.xlsx", products_table())
}
