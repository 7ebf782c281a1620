use pbi_store::models::{AnalysisContext, Row};

use super::AnalystError;

pub const QUERY_SYSTEM: &str = "You are a DAX query expert. Generate only valid, clean DAX queries without any markup or formatting.";
pub const INTERPRET_SYSTEM: &str =
    "You are a helpful data analyst providing insights from Power BI data.";
pub const SUGGEST_SYSTEM: &str =
    "You are a data analyst suggesting interesting questions about data.";

pub fn query_prompt(question: &str, context: &AnalysisContext) -> Result<String, AnalystError> {
    let schemas = serde_json::to_string_pretty(&context.schemas)?;
    let samples = serde_json::to_string_pretty(&context.samples)?;
    Ok(format!(
        "You are a Power BI DAX expert. Generate a DAX query to answer the following question.

Available tables and their schemas:
{schemas}

Sample data for reference:
{samples}

User question: {question}

IMPORTANT RULES:
1. Generate only the DAX query without any explanation
2. Do NOT use any HTML or XML tags in the query
3. Do NOT use angle brackets < or > except for DAX operators
4. Use only valid DAX syntax
5. Reference only columns that exist in the schema
6. The query should be executable as-is

Example format:
EVALUATE SUMMARIZE(Sales, Product[Category], \"Total\", SUM(Sales[Amount]))"
    ))
}

pub fn interpret_prompt(question: &str, rows: &[Row], query: &str) -> Result<String, AnalystError> {
    let results = serde_json::to_string_pretty(rows)?;
    Ok(format!(
        "You are a data analyst helping users understand their Power BI data.

User question: {question}

DAX query executed: {query}

Query results:
{results}

Provide a clear, concise answer to the user's question based on the results.
Include relevant numbers and insights. Format the response in a user-friendly way.
Do not use any HTML or XML markup in your response."
    ))
}

pub fn suggest_prompt(context: &AnalysisContext) -> Result<String, AnalystError> {
    let schemas = serde_json::to_string_pretty(&context.schemas)?;
    Ok(format!(
        "Based on the following Power BI dataset structure, suggest 5 interesting questions a user might ask:

Tables and schemas:
{schemas}

Generate 5 diverse questions that would showcase different aspects of the data.
Return only the questions as a JSON array."
    ))
}
