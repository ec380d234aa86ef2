//! Context compaction
//!
//! Projects an indexed database into the bounded structure injected into
//! prompts. `Full` carries row counts, semantic types and up to five sample
//! values per column; `Compact` keeps only names, types and descriptions.

use crate::error::{Error, Result};
use crate::index::SchemaIndex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Sample values per column included in full context
pub const CONTEXT_SAMPLE_VALUES: usize = 5;

/// Context fidelity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Full,
    Compact,
}

impl std::fmt::Display for ContextMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextMode::Full => write!(f, "full"),
            ContextMode::Compact => write!(f, "compact"),
        }
    }
}

impl FromStr for ContextMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(ContextMode::Full),
            "compact" => Ok(ContextMode::Compact),
            _ => Err(Error::Config(format!(
                "Unknown context mode '{}'; expected full or compact",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextTable {
    pub table_id: i64,
    /// Fully-qualified name
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    pub columns: Vec<ContextColumn>,
}

/// Prompt-ready view of one indexed database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpContext {
    pub database_id: i64,
    pub database_name: String,
    pub engine_type: String,
    pub mode: ContextMode,
    pub tables: Vec<ContextTable>,
}

impl NlpContext {
    /// Fully-qualified names of every table in the context
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}

/// `AND t.id IN (?, ...)` for a non-empty allow-list
fn table_filter(selected: &[i64]) -> String {
    if selected.is_empty() {
        return String::new();
    }
    let placeholders = selected.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    format!(" AND id IN ({})", placeholders)
}

impl SchemaIndex {
    /// Context in the requested fidelity
    pub async fn get_context(
        &self,
        database_id: i64,
        selected: &[i64],
        mode: ContextMode,
    ) -> Result<NlpContext> {
        match mode {
            ContextMode::Full => self.get_nlp_context(database_id, selected).await,
            ContextMode::Compact => self.get_compact_nlp_context(database_id, selected).await,
        }
    }

    /// Full context: tables by descending row count, columns by name
    ///
    /// An empty `selected` list means every table.
    pub async fn get_nlp_context(&self, database_id: i64, selected: &[i64]) -> Result<NlpContext> {
        let database = self.require_active(database_id).await?;

        let query = format!(
            "SELECT id, full_table_name, business_description, row_count FROM indexed_tables \
             WHERE database_id = ?{} ORDER BY row_count DESC, id",
            table_filter(selected)
        );
        let mut query_builder = sqlx::query_as::<_, (i64, String, String, i64)>(&query).bind(database_id);
        for id in selected {
            query_builder = query_builder.bind(id);
        }
        let rows = query_builder.fetch_all(self.pool()).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for (table_id, name, description, row_count) in rows {
            let columns = self
                .get_columns(table_id)
                .await?
                .into_iter()
                .map(|c| ContextColumn {
                    name: c.name,
                    data_type: c.data_type,
                    semantic_type: Some(c.semantic_type),
                    description: c.description,
                    sample_values: Some(
                        c.sample_values
                            .into_iter()
                            .take(CONTEXT_SAMPLE_VALUES)
                            .collect(),
                    ),
                })
                .collect();

            tables.push(ContextTable {
                table_id,
                name,
                description,
                row_count: Some(row_count),
                columns,
            });
        }

        debug!(database_id, tables = tables.len(), "Built full context");
        Ok(NlpContext {
            database_id,
            database_name: database.connection_name,
            engine_type: database.engine_type,
            mode: ContextMode::Full,
            tables,
        })
    }

    /// Compact context: names, types and descriptions only, tables by name
    pub async fn get_compact_nlp_context(
        &self,
        database_id: i64,
        selected: &[i64],
    ) -> Result<NlpContext> {
        let database = self.require_active(database_id).await?;

        let query = format!(
            "SELECT id, full_table_name, business_description FROM indexed_tables \
             WHERE database_id = ?{} ORDER BY full_table_name, id",
            table_filter(selected)
        );
        let mut query_builder = sqlx::query_as::<_, (i64, String, String)>(&query).bind(database_id);
        for id in selected {
            query_builder = query_builder.bind(id);
        }
        let rows = query_builder.fetch_all(self.pool()).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for (table_id, name, description) in rows {
            let columns: Vec<(String, String, String)> = sqlx::query_as(
                r#"
                SELECT column_name, data_type, business_description
                FROM indexed_columns
                WHERE table_id = ?
                ORDER BY column_name
                "#,
            )
            .bind(table_id)
            .fetch_all(self.pool())
            .await?;

            tables.push(ContextTable {
                table_id,
                name,
                description,
                row_count: None,
                columns: columns
                    .into_iter()
                    .map(|(name, data_type, description)| ContextColumn {
                        name,
                        data_type,
                        semantic_type: None,
                        description,
                        sample_values: None,
                    })
                    .collect(),
            });
        }

        debug!(database_id, tables = tables.len(), "Built compact context");
        Ok(NlpContext {
            database_id,
            database_name: database.connection_name,
            engine_type: database.engine_type,
            mode: ContextMode::Compact,
            tables,
        })
    }
}
