use super::{ColumnContext, ColumnDescription, Describer, TableContext, TableDescription};
use crate::error::{Error, Result};
use crate::llm::{extract_code_block, ChatMessage, LlmClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

const TABLE_SYSTEM_PROMPT: &str =
    "You are a database analyst. Analyze tables and provide business descriptions and search keywords.";

const COLUMN_SYSTEM_PROMPT: &str =
    "You are a database analyst. Analyze columns and provide semantic types and descriptions.";

/// Longest free-text reply kept as a description when the model ignores the JSON format
const MAX_FALLBACK_GRAPHEMES: usize = 200;

/// Describer backed by a chat model
pub struct LlmDescriber {
    client: Arc<dyn LlmClient>,
}

impl LlmDescriber {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    async fn ask(&self, system: &str, prompt: String) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        self.client
            .complete(&messages)
            .await
            .map_err(|e| Error::Generation(e.to_string()))
    }
}

fn table_prompt(ctx: &TableContext<'_>) -> String {
    let columns_info = ctx
        .columns
        .iter()
        .take(10)
        .map(|c| format!("{} ({})", c.name, c.data_type))
        .collect::<Vec<_>>()
        .join(", ");
    let sample_info = if ctx.sample_rows.is_empty() {
        "No sample data".to_string()
    } else {
        let head = &ctx.sample_rows[..ctx.sample_rows.len().min(3)];
        serde_json::to_string_pretty(head).unwrap_or_else(|_| "No sample data".to_string())
    };

    format!(
        r#"Analyze this database table and provide a business description and keywords:

Table: {}
Columns: {}
Sample Data: {}

Please provide:
1. A concise business description (1-2 sentences) explaining what this table contains
2. Relevant keywords for searching (comma-separated)

Format your response as JSON:
{{
    "description": "Business description here",
    "keywords": "keyword1, keyword2, keyword3"
}}"#,
        ctx.table_name, columns_info, sample_info
    )
}

fn column_prompt(ctx: &ColumnContext<'_>) -> String {
    let sample_info = if ctx.sample_values.is_empty() {
        "No sample data".to_string()
    } else {
        ctx.sample_values
            .iter()
            .take(5)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"Analyze this database column and provide semantic type and description:

Table: {}
Column: {}
Data Type: {}
Sample Values: {}

Please provide:
1. Semantic type (e.g., customer_id, email, phone, date, amount, name, address, etc.)
2. Brief description of what this column represents

Format your response as JSON:
{{
    "semantic_type": "semantic_type_here",
    "description": "Column description here"
}}"#,
        ctx.table_name, ctx.column_name, ctx.data_type, sample_info
    )
}

/// Parse a JSON object out of a reply, tolerating a fenced block
fn parse_json_reply(content: &str) -> Option<serde_json::Map<String, Value>> {
    let body = extract_code_block(content, "json").unwrap_or_else(|| content.trim().to_string());
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Read a string field; lists are joined with ", "
fn text_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn truncate_graphemes(text: &str, max: usize) -> String {
    text.trim().graphemes(true).take(max).collect()
}

fn parse_table_reply(content: &str, table_name: &str) -> TableDescription {
    match parse_json_reply(content) {
        Some(obj) => TableDescription {
            description: text_field(&obj, "description"),
            keywords: text_field(&obj, "keywords"),
        },
        None => TableDescription {
            description: truncate_graphemes(content, MAX_FALLBACK_GRAPHEMES),
            keywords: table_name.replace('_', ", "),
        },
    }
}

fn parse_column_reply(content: &str, table_name: &str, column_name: &str) -> ColumnDescription {
    match parse_json_reply(content) {
        Some(obj) => ColumnDescription {
            semantic_type: text_field(&obj, "semantic_type"),
            description: text_field(&obj, "description"),
        },
        None => ColumnDescription {
            semantic_type: column_name.to_string(),
            description: format!("{} column in {}", column_name, table_name),
        },
    }
}

#[async_trait]
impl Describer for LlmDescriber {
    async fn describe_table(&self, ctx: &TableContext<'_>) -> Result<TableDescription> {
        let content = self.ask(TABLE_SYSTEM_PROMPT, table_prompt(ctx)).await?;
        Ok(parse_table_reply(&content, ctx.table_name))
    }

    async fn describe_column(&self, ctx: &ColumnContext<'_>) -> Result<ColumnDescription> {
        let content = self.ask(COLUMN_SYSTEM_PROMPT, column_prompt(ctx)).await?;
        Ok(parse_column_reply(&content, ctx.table_name, ctx.column_name))
    }
}
