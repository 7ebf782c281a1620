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

/// Parameters for describing a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetTableInfoParams {
    /// Name of the table.
    #[serde(default)]
    pub table_name: Option<String>,
}

#[tool_router(router = tool_router_tables, vis = "pub")]
impl PbiMcp {
    #[tool(description = "List all available tables in the connected Power BI dataset.")]
    async fn list_tables(&self) -> Result<CallToolResult, ErrorData> {
        Ok(helpers::text_result(self.control.list_tables().await))
    }

    #[tool(description = "Get columns and sample rows of a data table, or the measures of a measure table.")]
    async fn get_table_info(
        &self,
        Parameters(params): Parameters<GetTableInfoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let reply = self
            .control
            .get_table_info(params.table_name.as_deref())
            .await;
        Ok(helpers::text_result(reply))
    }
}
