use pbi_store::models::rows_to_json;

use super::{ControlError, NOT_CONNECTED, PbiControlPlane, ToolCallResult, ToolName, non_blank};

impl PbiControlPlane {
    /// Runs a DAX query and returns the rows as pretty JSON.
    pub async fn execute_query(&self, query: Option<&str>) -> ToolCallResult {
        if !self.connector.is_connected() {
            return ToolCallResult::from(NOT_CONNECTED);
        }
        let Some(query) = non_blank(query) else {
            return ToolCallResult::from("Please provide a query.");
        };
        Self::respond(ToolName::ExecuteQuery, self.run_query(query).await)
    }

    async fn run_query(&self, query: &str) -> Result<String, ControlError> {
        let rows = self.connector.execute_query(query).await?;
        Ok(rows_to_json(&rows)?)
    }
}
