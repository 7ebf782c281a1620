use std::fmt::Write as _;

use pbi_store::models::{TableDescriptor, TableKind, rows_to_json};

use super::{ControlError, NOT_CONNECTED, PbiControlPlane, ToolCallResult, ToolName, non_blank};

/// Rows shown with a data table's description.
pub const TABLE_INFO_SAMPLE_ROWS: usize = 5;

impl PbiControlPlane {
    /// Lists the user tables of the connected dataset.
    pub async fn list_tables(&self) -> ToolCallResult {
        if !self.connector.is_connected() {
            return ToolCallResult::from(NOT_CONNECTED);
        }
        Self::respond(ToolName::ListTables, self.render_tables().await)
    }

    /// Describes one table: columns and sample rows, or its measures.
    pub async fn get_table_info(&self, table_name: Option<&str>) -> ToolCallResult {
        if !self.connector.is_connected() {
            return ToolCallResult::from(NOT_CONNECTED);
        }
        let Some(table) = non_blank(table_name) else {
            return ToolCallResult::from("Please provide a table name.");
        };
        Self::respond(ToolName::GetTableInfo, self.render_table_info(table).await)
    }

    async fn render_tables(&self) -> Result<String, ControlError> {
        let tables = self.connector.discover_tables().await?;
        if tables.is_empty() {
            return Ok("No tables found in the dataset.".to_string());
        }
        let listing = tables
            .iter()
            .map(|table| format!("- {table}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("Available tables:\n{listing}"))
    }

    async fn render_table_info(&self, table: &str) -> Result<String, ControlError> {
        let schema = self.connector.table_schema(table).await?;
        if schema.kind == TableKind::DataTable {
            let rows = self
                .connector
                .sample_data(table, TABLE_INFO_SAMPLE_ROWS)
                .await?;
            let columns = schema.column_names().collect::<Vec<_>>().join(", ");
            return Ok(format!(
                "Table: {table}\nType: {}\nColumns: {columns}\n\nSample data:\n{}",
                TableKind::DataTable.label(),
                rows_to_json(&rows)?
            ));
        }
        Ok(describe_without_sample(table, &schema))
    }
}

fn describe_without_sample(table: &str, schema: &TableDescriptor) -> String {
    match schema.kind {
        TableKind::MeasureTable => {
            let mut text = format!("Table: {table}\nType: {}\nMeasures:\n", schema.kind.label());
            for measure in &schema.measures {
                let _ = write!(
                    text,
                    "\n- {}:\n  DAX: {}\n",
                    measure.name, measure.expression
                );
            }
            text
        }
        kind => {
            let mut text = format!("Table: {table}\nType: {}", kind.as_str());
            if let Some(message) = &schema.error {
                let _ = write!(text, "\nError: {message}");
            }
            text
        }
    }
}
