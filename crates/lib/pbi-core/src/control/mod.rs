//! Tool dispatcher.
//!
//! Each operation returns a [`ToolCallResult`]. Failures from the connector,
//! the worker pool or the analyst never escape; they are rendered as text.

use std::{error::Error, fmt, str::FromStr, sync::Arc};

use tracing::error;

use crate::analyst::{Analyst, AnalystError};
use crate::connector::{Connector, ConnectorError};
use crate::pool::PoolError;
use crate::primer::AnalysisSlot;

pub mod connection;
pub mod language;
pub mod query;
pub mod tables;

pub use connection::{ConnectArgs, CredentialDefaults};

pub(crate) const NOT_CONNECTED: &str =
    "Not connected to Power BI. Please connect first using 'connect'.";
pub(crate) const NOT_CONFIGURED: &str = "OpenAI API key not configured.";

#[derive(Debug)]
pub enum ControlError {
    Connector(ConnectorError),
    Analyst(AnalystError),
    Pool(PoolError),
    Encode(serde_json::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connector(err) => write!(f, "{err}"),
            Self::Analyst(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to serialize results: {err}"),
        }
    }
}

impl Error for ControlError {}

impl From<ConnectorError> for ControlError {
    fn from(err: ConnectorError) -> Self {
        Self::Connector(err)
    }
}

impl From<AnalystError> for ControlError {
    fn from(err: AnalystError) -> Self {
        Self::Analyst(err)
    }
}

impl From<PoolError> for ControlError {
    fn from(err: PoolError) -> Self {
        Self::Pool(err)
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err)
    }
}

/// Names of the operations the dispatcher exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Connect,
    ListTables,
    GetTableInfo,
    ExecuteQuery,
    AskQuestion,
    SuggestQuestions,
}

impl ToolName {
    pub const ALL: [Self; 6] = [
        Self::Connect,
        Self::ListTables,
        Self::GetTableInfo,
        Self::ExecuteQuery,
        Self::AskQuestion,
        Self::SuggestQuestions,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ListTables => "list_tables",
            Self::GetTableInfo => "get_table_info",
            Self::ExecuteQuery => "execute_query",
            Self::AskQuestion => "ask_question",
            Self::SuggestQuestions => "suggest_questions",
        }
    }

    /// True for operations that need the language model.
    #[must_use]
    pub const fn needs_language_model(self) -> bool {
        matches!(self, Self::AskQuestion | Self::SuggestQuestions)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| format!("Unknown tool: {name}"))
    }
}

/// Capabilities resolved once when the control plane is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub natural_language: bool,
}

/// Text reply of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    pub text: String,
}

impl ToolCallResult {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<String> for ToolCallResult {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for ToolCallResult {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Routes tool calls to the connector and the analyst.
#[derive(Clone)]
pub struct PbiControlPlane {
    connector: Arc<Connector>,
    analyst: Option<Arc<dyn Analyst>>,
    analysis: AnalysisSlot,
    defaults: CredentialDefaults,
}

impl PbiControlPlane {
    #[must_use]
    pub fn new(connector: Arc<Connector>, defaults: CredentialDefaults) -> Self {
        Self {
            connector,
            analyst: None,
            analysis: AnalysisSlot::new(),
            defaults,
        }
    }

    /// Enables the natural-language operations.
    #[must_use]
    pub fn with_analyst(mut self, analyst: Arc<dyn Analyst>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    #[must_use]
    pub const fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// The analysis context slot filled by the background primer.
    #[must_use]
    pub const fn analysis(&self) -> &AnalysisSlot {
        &self.analysis
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            natural_language: self.analyst.is_some(),
        }
    }

    /// Operations offered to clients given the resolved capabilities.
    #[must_use]
    pub fn advertised_tools(&self) -> Vec<ToolName> {
        let capabilities = self.capabilities();
        ToolName::ALL
            .into_iter()
            .filter(|tool| capabilities.natural_language || !tool.needs_language_model())
            .collect()
    }

    fn respond(tool: ToolName, outcome: Result<String, ControlError>) -> ToolCallResult {
        match outcome {
            Ok(text) => ToolCallResult::from(text),
            Err(err) => {
                error!(tool = %tool, %err, "tool call failed");
                ToolCallResult::from(format!("Error executing {tool}: {err}"))
            }
        }
    }
}

impl fmt::Debug for PbiControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PbiControlPlane")
            .field("connector", &self.connector)
            .field("capabilities", &self.capabilities())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Returns the trimmed value when it is present and not blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
