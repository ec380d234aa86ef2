//! Natural language to SQL
//!
//! One model call per question: read the context, render the prompt, pull
//! the SQL out of the reply and run the GROUP BY repair over it. Retries
//! belong to the HTTP client, not here.

use crate::context::ContextMode;
use crate::error::{Error, Result};
use crate::index::SchemaIndex;
use crate::llm::{extract_code_block, LlmClient};
use crate::prompt;
use crate::repair::{repair_group_by, RepairAction};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Successful synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub original_query: String,
    /// SQL after repair
    pub sql_query: String,
    /// SQL as extracted from the model reply
    pub generated_sql: String,
    pub validation_message: String,
    pub repair_action: RepairAction,
    pub database_name: String,
    pub available_tables: Vec<String>,
    pub context_mode: ContextMode,
    pub model: String,
}

/// Status-tagged result of a synthesis request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SynthesisOutcome {
    Success(SynthesisReport),
    Error { message: String },
}

impl SynthesisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Success(_))
    }
}

/// Review of a query, as returned by the model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default)]
    pub performance_suggestions: Vec<String>,
    #[serde(default)]
    pub readability_improvements: Vec<String>,
    #[serde(default)]
    pub potential_issues: Vec<String>,
    #[serde(default)]
    pub alternative_approaches: Vec<String>,
    #[serde(default)]
    pub overall_assessment: String,
    /// Reply text when it was not the requested JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// SQL text of a model reply: first fenced sql block, else the whole reply
pub fn extract_sql(content: &str) -> Option<String> {
    let sql = extract_code_block(content, "sql").unwrap_or_else(|| content.trim().to_string());
    if sql.is_empty() {
        None
    } else {
        Some(sql)
    }
}

pub struct QuerySynthesizer<'a> {
    index: &'a SchemaIndex,
    llm: &'a dyn LlmClient,
}

impl<'a> QuerySynthesizer<'a> {
    pub fn new(index: &'a SchemaIndex, llm: &'a dyn LlmClient) -> Self {
        Self { index, llm }
    }

    /// Turn a question into repaired SQL
    ///
    /// An empty `selected_tables` list means every table.
    pub async fn convert_query(
        &self,
        database_id: i64,
        question: &str,
        selected_tables: &[i64],
        mode: ContextMode,
    ) -> SynthesisOutcome {
        match self
            .synthesize(database_id, question, selected_tables, mode)
            .await
        {
            Ok(report) => SynthesisOutcome::Success(report),
            Err(e) => {
                error!(database_id, error = %e, "Query synthesis failed");
                SynthesisOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn synthesize(
        &self,
        database_id: i64,
        question: &str,
        selected_tables: &[i64],
        mode: ContextMode,
    ) -> Result<SynthesisReport> {
        let context = self
            .index
            .get_context(database_id, selected_tables, mode)
            .await?;
        info!(
            database_id,
            tables = context.tables.len(),
            mode = %mode,
            model = self.llm.model_name(),
            "Synthesizing SQL"
        );

        let messages = prompt::build_messages(&context, question);
        let reply = self.llm.complete(&messages).await?;
        let generated = extract_sql(&reply).ok_or(Error::EmptySynthesis)?;

        let repaired = repair_group_by(&generated);
        if repaired.action == RepairAction::Unrepaired {
            warn!(message = %repaired.message, "Generated SQL left with GROUP BY mismatch");
        }

        Ok(SynthesisReport {
            original_query: question.to_string(),
            sql_query: repaired.sql,
            generated_sql: generated,
            validation_message: repaired.message,
            repair_action: repaired.action,
            available_tables: context.table_names(),
            database_name: context.database_name,
            context_mode: mode,
            model: self.llm.model_name().to_string(),
        })
    }

    /// Plain-language explanation of `sql`, optionally with database context
    pub async fn explain_query(&self, sql: &str, database_id: Option<i64>) -> Result<String> {
        let context = match database_id {
            Some(id) => {
                let context = self.index.get_nlp_context(id, &[]).await?;
                Some(serde_json::to_string_pretty(&context)?)
            }
            None => None,
        };

        let messages = prompt::build_explain_messages(sql, context.as_deref());
        let reply = self.llm.complete(&messages).await?;
        Ok(reply.trim().to_string())
    }

    /// Review suggestions for `sql` against a database's context
    pub async fn suggest_improvements(&self, database_id: i64, sql: &str) -> Result<Suggestions> {
        let context = self.index.get_nlp_context(database_id, &[]).await?;
        let context_json = serde_json::to_string_pretty(&context)?;

        let messages = prompt::build_suggest_messages(sql, &context_json);
        let reply = self.llm.complete(&messages).await?;

        let body = extract_code_block(&reply, "json").unwrap_or_else(|| reply.trim().to_string());
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| Suggestions {
            raw_response: Some(reply),
            ..Default::default()
        }))
    }
}
