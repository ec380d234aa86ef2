//! Table and column annotation
//!
//! Indexing asks a [`Describer`] for a business description and search
//! keywords per table, and a semantic type plus description per column.
//! [`NoDescriptions`] leaves every field empty; [`LlmDescriber`] asks a
//! chat model.

mod llm;

pub use llm::*;

use crate::error::Result;
use crate::extract::ColumnDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a describer sees of a table
#[derive(Debug, Clone, Copy)]
pub struct TableContext<'a> {
    pub table_name: &'a str,
    pub columns: &'a [ColumnDescriptor],
    pub sample_rows: &'a [Map<String, Value>],
}

/// What a describer sees of a column
#[derive(Debug, Clone, Copy)]
pub struct ColumnContext<'a> {
    pub table_name: &'a str,
    pub column_name: &'a str,
    pub data_type: &'a str,
    pub sample_values: &'a [String],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub description: String,
    pub keywords: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub semantic_type: String,
    pub description: String,
}

/// Trait for description generators
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe_table(&self, ctx: &TableContext<'_>) -> Result<TableDescription>;

    async fn describe_column(&self, ctx: &ColumnContext<'_>) -> Result<ColumnDescription>;
}

/// Describer that produces nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDescriptions;

#[async_trait]
impl Describer for NoDescriptions {
    async fn describe_table(&self, _ctx: &TableContext<'_>) -> Result<TableDescription> {
        Ok(TableDescription::default())
    }

    async fn describe_column(&self, _ctx: &ColumnContext<'_>) -> Result<ColumnDescription> {
        Ok(ColumnDescription::default())
    }
}
