//! Metadata extractor boundary
//!
//! Per-engine loaders live outside this crate. They hand the index a flat list
//! of table descriptors, either through the [`MetadataExtractor`] trait or as a
//! JSON dump on disk.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Source database engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Engine {
    Mssql,
    Mysql,
    Postgres,
    Sqlite,
    Kusto,
    Other(String),
}

impl Engine {
    /// Namespace assigned to tables whose name carries no qualifier
    pub fn default_schema(&self) -> &'static str {
        match self {
            Engine::Mssql => "dbo",
            Engine::Postgres => "public",
            Engine::Sqlite => "main",
            Engine::Mysql | Engine::Kusto | Engine::Other(_) => "default",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Mssql => write!(f, "mssql"),
            Engine::Mysql => write!(f, "mysql"),
            Engine::Postgres => write!(f, "postgres"),
            Engine::Sqlite => write!(f, "sqlite"),
            Engine::Kusto => write!(f, "kusto"),
            Engine::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "" => Err(Error::Config("Engine type must not be empty".to_string())),
            "mssql" | "sqlserver" => Ok(Engine::Mssql),
            "mysql" => Ok(Engine::Mysql),
            "postgres" | "postgresql" => Ok(Engine::Postgres),
            "sqlite" => Ok(Engine::Sqlite),
            "kusto" => Ok(Engine::Kusto),
            _ => Ok(Engine::Other(name)),
        }
    }
}

/// One table as reported by an extractor
///
/// `metadata` stays raw: its shape is checked per table during indexing so
/// that one bad entry cannot sink a whole pass.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub schema: Option<String>,
    pub metadata: Value,
}

/// Typed view of a descriptor's metadata block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub sample_rows: Vec<Map<String, Value>>,
}

/// One column as reported by an extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl TableMetadata {
    /// Row count, -1 when the extractor did not measure it
    pub fn row_count(&self) -> i64 {
        self.row_count.unwrap_or(-1)
    }
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, metadata: Value) -> Self {
        Self {
            name: name.into(),
            schema: None,
            metadata,
        }
    }

    /// Namespace of the table: dotted qualifier, explicit schema, or engine default
    pub fn schema_name(&self, engine: &Engine) -> String {
        match self.name.split_once('.') {
            Some((schema, _)) if !schema.is_empty() => schema.to_string(),
            _ => self
                .schema
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| engine.default_schema().to_string()),
        }
    }

    /// Unqualified table name
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Decode the metadata block
    pub fn parse_metadata(&self) -> Result<TableMetadata> {
        if self.metadata.is_null() {
            return Ok(TableMetadata::default());
        }
        let mut metadata: TableMetadata = serde_json::from_value(self.metadata.clone())
            .map_err(|e| {
                Error::MalformedInput(format!("Invalid metadata for table '{}': {}", self.name, e))
            })?;
        metadata.columns.retain(|c| !c.name.is_empty());
        Ok(metadata)
    }
}

/// Validate raw extractor output and turn it into descriptors
///
/// Accepts either a bare list or an object with a `tables` list. Entries use
/// the `{name, metadata}` layout, or the direct layout with `schema`,
/// `columns`, `row_count` and `sample_rows` at the top level.
pub fn parse_table_list(raw: &Value) -> Result<Vec<TableDescriptor>> {
    let entries = match raw {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("tables") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::MalformedInput(format!(
                    "'tables' must be a list, got {}",
                    json_kind(other)
                )))
            }
            None => {
                return Err(Error::MalformedInput(
                    "Extractor output has no 'tables' list".to_string(),
                ))
            }
        },
        other => {
            return Err(Error::MalformedInput(format!(
                "Extractor output must be a list of tables, got {}",
                json_kind(other)
            )))
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| parse_table_entry(idx, entry))
        .collect()
}

fn parse_table_entry(idx: usize, entry: &Value) -> Result<TableDescriptor> {
    let obj = entry.as_object().ok_or_else(|| {
        Error::MalformedInput(format!(
            "Table entry {} must be an object, got {}",
            idx,
            json_kind(entry)
        ))
    })?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::MalformedInput(format!("Table entry {} has no name", idx)))?;

    let schema = obj
        .get("schema")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    // Qualify bare names so the stored full name keeps its namespace
    let name = match &schema {
        Some(schema) if !name.contains('.') => format!("{}.{}", schema, name),
        _ => name.to_string(),
    };

    let metadata = match obj.get("metadata") {
        Some(metadata) => metadata.clone(),
        None => {
            let mut direct = Map::new();
            for key in ["row_count", "columns", "sample_rows"] {
                if let Some(value) = obj.get(key) {
                    direct.insert(key.to_string(), value.clone());
                }
            }
            Value::Object(direct)
        }
    };

    Ok(TableDescriptor {
        name,
        schema,
        metadata,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Trait for metadata extractors
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Enumerate every table with its metadata
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>>;
}

/// Extractor over an already-collected list
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    tables: Vec<TableDescriptor>,
}

impl StaticExtractor {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self { tables }
    }

    /// Build from raw extractor JSON, validating its shape
    pub fn from_json(raw: &Value) -> Result<Self> {
        Ok(Self::new(parse_table_list(raw)?))
    }
}

#[async_trait]
impl MetadataExtractor for StaticExtractor {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        Ok(self.tables.clone())
    }
}

/// Extractor reading a JSON dump written by an external loader
#[derive(Debug, Clone)]
pub struct JsonDumpExtractor {
    path: PathBuf,
}

impl JsonDumpExtractor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl MetadataExtractor for JsonDumpExtractor {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        debug!("Reading table dump from {:?}", self.path);
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::ConnectionFailure(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| Error::MalformedInput(format!("Invalid JSON dump: {}", e)))?;
        parse_table_list(&raw)
    }
}
