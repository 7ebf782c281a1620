use pbi_core::control::ToolCallResult;
use rmcp::model::{CallToolResult, Content};

/// Wraps a dispatcher reply as a successful text tool result.
///
/// Failures are already rendered into the text, so tools never return an
/// MCP error for them.
pub(crate) fn text_result(result: ToolCallResult) -> CallToolResult {
    CallToolResult::success(vec![Content::text(result.text)])
}
