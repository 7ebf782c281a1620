//! Chat-completions client for an OpenAI-compatible endpoint.

use std::fmt;
use std::time::Duration;

use pbi_store::models::{AnalysisContext, Row};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::prompts::{
    INTERPRET_SYSTEM, QUERY_SYSTEM, SUGGEST_SYSTEM, interpret_prompt, query_prompt, suggest_prompt,
};
use super::{Analyst, AnalystError, parse_suggestions};
use crate::sanitize::sanitize;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const QUERY_TEMPERATURE: f32 = 0.1;
const INTERPRET_TEMPERATURE: f32 = 0.3;
const SUGGEST_TEMPERATURE: f32 = 0.7;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OpenAiConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

/// Blocking analyst backed by the chat-completions API.
///
/// Each call builds its own HTTP client so it can run on any worker thread.
#[derive(Debug, Clone)]
pub struct OpenAiAnalyst {
    config: OpenAiConfig,
}

impl OpenAiAnalyst {
    #[must_use]
    pub const fn new(config: OpenAiConfig) -> Self {
        Self { config }
    }

    fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, AnalystError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": &self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": temperature
        });

        debug!(model = %self.config.model, temperature, "requesting chat completion");
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let response = client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalystError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AnalystError::EmptyResponse)
    }
}

impl Analyst for OpenAiAnalyst {
    fn generate_query(
        &self,
        question: &str,
        context: &AnalysisContext,
    ) -> Result<String, AnalystError> {
        let prompt = query_prompt(question, context)?;
        let reply = self.complete(QUERY_SYSTEM, &prompt, QUERY_TEMPERATURE)?;
        Ok(sanitize(reply.trim()))
    }

    fn interpret_results(
        &self,
        question: &str,
        rows: &[Row],
        query: &str,
    ) -> Result<String, AnalystError> {
        let prompt = interpret_prompt(question, rows, query)?;
        self.complete(INTERPRET_SYSTEM, &prompt, INTERPRET_TEMPERATURE)
    }

    fn suggest_questions(&self, context: &AnalysisContext) -> Result<Vec<String>, AnalystError> {
        let prompt = suggest_prompt(context)?;
        let reply = self.complete(SUGGEST_SYSTEM, &prompt, SUGGEST_TEMPERATURE)?;
        Ok(parse_suggestions(&reply))
    }
}
