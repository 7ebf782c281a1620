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

/// Parameters for asking a question in natural language.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AskQuestionParams {
    /// Your question about the data.
    #[serde(default)]
    pub question: Option<String>,
}

#[tool_router(router = tool_router_language, vis = "pub")]
impl PbiMcp {
    #[tool(description = "Ask a question about the data in natural language.")]
    async fn ask_question(
        &self,
        Parameters(params): Parameters<AskQuestionParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let reply = self.control.ask_question(params.question.as_deref()).await;
        Ok(helpers::text_result(reply))
    }

    #[tool(description = "Get suggestions for interesting questions to ask about the data.")]
    async fn suggest_questions(&self) -> Result<CallToolResult, ErrorData> {
        Ok(helpers::text_result(self.control.suggest_questions().await))
    }
}
