use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::{PbiMcp, helpers};

/// Parameters for running a DAX query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExecuteQueryParams {
    /// DAX query to execute.
    #[serde(default, alias = "dax_query")]
    pub query: Option<String>,
}

#[tool_router(router = tool_router_query, vis = "pub")]
impl PbiMcp {
    #[tool(description = "Execute a DAX query and return the rows as JSON.")]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<ExecuteQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let reply = self.control.execute_query(params.query.as_deref()).await;
        Ok(helpers::text_result(reply))
    }
}
