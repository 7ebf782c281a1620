use std::fmt::Write as _;
use std::sync::Arc;

use pbi_store::models::AnalysisContext;
use tracing::{debug, info};

use super::{
    ControlError, NOT_CONFIGURED, NOT_CONNECTED, PbiControlPlane, ToolCallResult, ToolName,
    non_blank,
};
use crate::analyst::Analyst;
use crate::sanitize::sanitize;

const ANALYZER_NOT_READY: &str =
    "Data analyzer not initialized. Please wait for tables to be discovered.";

impl PbiControlPlane {
    /// Answers a natural-language question: the analyst writes a query, the
    /// connector runs it, and the analyst narrates the rows.
    pub async fn ask_question(&self, question: Option<&str>) -> ToolCallResult {
        let (analyst, context) = match self.language_ready() {
            Ok(ready) => ready,
            Err(text) => return ToolCallResult::from(text),
        };
        let Some(question) = non_blank(question) else {
            return ToolCallResult::from("Please provide a question.");
        };
        Self::respond(
            ToolName::AskQuestion,
            self.answer(analyst, context, question).await,
        )
    }

    /// Asks the analyst for questions worth exploring.
    pub async fn suggest_questions(&self) -> ToolCallResult {
        let (analyst, context) = match self.language_ready() {
            Ok(ready) => ready,
            Err(text) => return ToolCallResult::from(text),
        };
        Self::respond(
            ToolName::SuggestQuestions,
            self.suggest(analyst, context).await,
        )
    }

    fn language_ready(&self) -> Result<(Arc<dyn Analyst>, Arc<AnalysisContext>), &'static str> {
        let analyst = self.analyst.clone().ok_or(NOT_CONFIGURED)?;
        if !self.connector.is_connected() {
            return Err(NOT_CONNECTED);
        }
        let Some(context) = self.analysis.current() else {
            debug!(priming = self.connector.is_priming(), "analysis context not ready");
            return Err(ANALYZER_NOT_READY);
        };
        Ok((analyst, context))
    }

    async fn answer(
        &self,
        analyst: Arc<dyn Analyst>,
        context: Arc<AnalysisContext>,
        question: &str,
    ) -> Result<String, ControlError> {
        let pool = self.connector.pool();

        let asked = question.to_string();
        let writer = analyst.clone();
        let generated = pool
            .run(move || writer.generate_query(&asked, &context))
            .await??;
        let query = sanitize(&generated);
        info!(query = %query, "generated DAX query");

        let rows = self.connector.execute_query(&query).await?;

        let asked = question.to_string();
        let executed = query.clone();
        let interpretation = pool
            .run(move || analyst.interpret_results(&asked, &rows, &executed))
            .await??;

        Ok(format!(
            "Question: {question}\n\nDAX Query:\n{query}\n\nAnswer:\n{interpretation}"
        ))
    }

    async fn suggest(
        &self,
        analyst: Arc<dyn Analyst>,
        context: Arc<AnalysisContext>,
    ) -> Result<String, ControlError> {
        let questions = self
            .connector
            .pool()
            .run(move || analyst.suggest_questions(&context))
            .await??;
        let mut text = String::from("Here are some questions you might want to ask:\n\n");
        for (index, question) in questions.iter().enumerate() {
            let _ = writeln!(text, "{}. {question}", index + 1);
        }
        Ok(text)
    }
}
