//! MCP server implementation for pbi-mcp.
//!
//! This crate wires the control plane into rmcp tool handlers and exposes the
//! stdio and streamable HTTP transports.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use pbi_core::control::PbiControlPlane;
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool_handler,
};
use rmcp::model::{ServerCapabilities, ServerInfo};

pub use tools::connection::ConnectParams;
pub use tools::language::AskQuestionParams;
pub use tools::query::ExecuteQueryParams;
pub use tools::tables::GetTableInfoParams;

const SERVER_INSTRUCTIONS: &str = r"pbi-mcp exposes a Power BI tabular model through MCP tools.

Workflow:
1. Call `connect` with the XMLA `endpoint` and dataset `catalog`. `tenant_id`, `client_id`
   and `client_secret` are optional when the server has default credentials.
2. Call `list_tables` to see the user tables of the dataset.
3. Call `get_table_info` with a `table_name` for columns and sample rows, or for the
   measures of a measure table.
4. Call `execute_query` with a DAX `query`; rows come back as JSON.

When the server has a language model configured:
- `ask_question` turns a question into DAX, runs it, and explains the result.
- `suggest_questions` proposes questions about the dataset.
Both need the background table discovery started by `connect` to finish first.

Notes:
- Every tool answers with text. Failures are reported as text, not protocol errors.
- Table and schema lists are cached for the life of the server.";

/// MCP server wrapper around the control plane and tool routers.
#[derive(Clone)]
pub struct PbiMcp {
    tool_router: ToolRouter<Self>,
    control: Arc<PbiControlPlane>,
}

impl PbiMcp {
    /// Creates a new server owning `control`.
    #[must_use]
    pub fn new(control: PbiControlPlane) -> Self {
        Self::with_control(Arc::new(control))
    }

    /// Creates a new server sharing a control plane handle.
    ///
    /// The language tools are routed only when the control plane has an analyst.
    #[must_use]
    pub fn with_control(control: Arc<PbiControlPlane>) -> Self {
        let mut tool_router = Self::tool_router_connection()
            + Self::tool_router_tables()
            + Self::tool_router_query();
        if control.capabilities().natural_language {
            tool_router = tool_router + Self::tool_router_language();
        }
        Self {
            tool_router,
            control,
        }
    }

    /// Names of the tools this server advertises.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect()
    }

    #[must_use]
    pub const fn control(&self) -> &Arc<PbiControlPlane> {
        &self.control
    }
}

#[tool_handler]
impl ServerHandler for PbiMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
