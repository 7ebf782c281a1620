//! Language-model collaborator used for natural-language questions.
//!
//! Analyst calls block; the control plane runs them on the worker pool.

use std::error::Error;
use std::fmt;

use pbi_store::models::{AnalysisContext, Row};

pub mod openai;
mod prompts;

pub use openai::{OpenAiAnalyst, OpenAiConfig};

/// Questions offered when the model's suggestion reply cannot be parsed.
pub const FALLBACK_QUESTIONS: [&str; 5] = [
    "What are the total sales?",
    "Show me the top 10 products",
    "What is the trend over time?",
    "Which region has the highest revenue?",
    "What are the key metrics?",
];

#[derive(Debug)]
pub enum AnalystError {
    Http(String),
    Api { status: u16, body: String },
    EmptyResponse,
    Encode(serde_json::Error),
}

impl fmt::Display for AnalystError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(message) => write!(f, "language model request failed: {message}"),
            Self::Api { status, body } => write!(f, "language model API error {status}: {body}"),
            Self::EmptyResponse => f.write_str("language model returned no choices"),
            Self::Encode(err) => write!(f, "failed to encode prompt data: {err}"),
        }
    }
}

impl Error for AnalystError {}

impl From<reqwest::Error> for AnalystError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AnalystError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err)
    }
}

/// Translates questions into DAX and narrates query results.
pub trait Analyst: Send + Sync {
    /// Produces a DAX query answering `question` against `context`.
    ///
    /// # Errors
    /// Returns `AnalystError` when the model call fails.
    fn generate_query(
        &self,
        question: &str,
        context: &AnalysisContext,
    ) -> Result<String, AnalystError>;

    /// Describes `rows` as an answer to `question`.
    ///
    /// # Errors
    /// Returns `AnalystError` when the model call fails.
    fn interpret_results(
        &self,
        question: &str,
        rows: &[Row],
        query: &str,
    ) -> Result<String, AnalystError>;

    /// Proposes questions worth asking about the model.
    ///
    /// # Errors
    /// Returns `AnalystError` when the model call fails.
    fn suggest_questions(&self, context: &AnalysisContext) -> Result<Vec<String>, AnalystError>;
}

/// Reads a JSON array of questions, tolerating a fenced code block around it.
#[must_use]
pub fn parse_suggestions(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    match serde_json::from_str::<Vec<String>>(body.trim()) {
        Ok(questions) if !questions.is_empty() => questions,
        _ => FALLBACK_QUESTIONS.iter().map(ToString::to_string).collect(),
    }
}
