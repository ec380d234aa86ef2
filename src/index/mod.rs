//! Schema index storage using SQLite
//!
//! This module owns the persisted catalog built by indexing passes:
//! - Databases (one row per pass, soft-deleted on removal)
//! - Schemas (namespaces within a database)
//! - Tables (row counts, samples, descriptions, keywords)
//! - Columns (types, sample values, semantic types)

mod pass;
mod schema;

pub use pass::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::FromRow;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle status of an indexed database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Active,
    Deleted,
}

impl std::fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseStatus::Active => write!(f, "active"),
            DatabaseStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for DatabaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(DatabaseStatus::Active),
            "deleted" => Ok(DatabaseStatus::Deleted),
            _ => Err(Error::Other(format!("Unknown database status: {}", s))),
        }
    }
}

/// An indexed database row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexedDatabase {
    pub id: i64,
    pub engine_type: String,
    pub connection_name: String,
    pub connection_params: String,
    pub indexed_at: String,
    pub total_tables: i64,
    pub total_schemas: i64,
    pub status: String,
}

impl IndexedDatabase {
    pub fn get_status(&self) -> Result<DatabaseStatus> {
        self.status.parse()
    }

    /// Decoded connection parameters, an empty object when unset
    pub fn params(&self) -> Result<Value> {
        if self.connection_params.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.connection_params)?)
    }
}

/// Listing entry for an active database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub database_id: i64,
    pub engine_type: String,
    pub connection_name: String,
    pub total_tables: i64,
    pub total_schemas: i64,
    pub indexed_at: String,
    pub status: String,
}

/// One namespace with its table names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub schema_id: i64,
    pub schema_name: String,
    pub table_count: i64,
    pub tables: Vec<String>,
}

/// Namespace layout of a database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub database_id: i64,
    pub connection_name: String,
    pub engine_type: String,
    pub total_tables: i64,
    pub total_schemas: i64,
    pub status: String,
    pub schemas: Vec<SchemaSummary>,
}

/// A column as stored in the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub foreign_key: bool,
    pub sample_values: Vec<String>,
    pub semantic_type: String,
    pub description: String,
}

#[derive(Debug, FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: bool,
    is_primary_key: bool,
    is_foreign_key: bool,
    sample_values: String,
    semantic_type: String,
    business_description: String,
}

impl From<ColumnRow> for IndexedColumn {
    fn from(row: ColumnRow) -> Self {
        Self {
            name: row.column_name,
            data_type: row.data_type,
            nullable: row.is_nullable,
            primary_key: row.is_primary_key,
            foreign_key: row.is_foreign_key,
            sample_values: decode_sample_values(&row.sample_values),
            semantic_type: row.semantic_type,
            description: row.business_description,
        }
    }
}

/// Full record of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDetails {
    pub table_id: i64,
    pub database_id: i64,
    pub table_name: String,
    pub short_name: String,
    pub schema_name: String,
    pub connection_name: String,
    pub row_count: i64,
    pub column_count: i64,
    pub description: String,
    pub keywords: String,
    pub metadata: Value,
    pub sample_data: Value,
    pub columns: Vec<IndexedColumn>,
}

#[derive(Debug, FromRow)]
struct TableRow {
    id: i64,
    database_id: i64,
    table_name: String,
    full_table_name: String,
    row_count: i64,
    column_count: i64,
    table_metadata: String,
    sample_data: String,
    business_description: String,
    keywords: String,
    schema_name: String,
    connection_name: String,
}

/// One table search result
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SearchHit {
    pub table_id: i64,
    pub table_name: String,
    pub description: String,
    pub keywords: String,
    pub row_count: i64,
    pub column_count: i64,
    pub schema_name: String,
}

/// Connection details recorded for an active database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub database_id: i64,
    pub engine_type: String,
    pub connection_name: String,
    pub connection_params: Value,
}

pub(crate) fn decode_sample_values(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn decode_blob(raw: &str, empty: Value) -> Value {
    serde_json::from_str(raw).unwrap_or(empty)
}

/// Escape LIKE wildcards so the keyword matches literally
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for ch in keyword.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Schema index database handle
#[derive(Clone)]
pub struct SchemaIndex {
    pool: SqlitePool,
}

impl SchemaIndex {
    /// Open the index for the configured session, creating it if needed
    pub async fn open(config: &Config) -> Result<Self> {
        Self::connect(
            &config.paths.index_db_file(),
            Duration::from_secs(config.index.busy_timeout_secs),
        )
        .await
    }

    /// Connect to an index file directly
    pub async fn connect(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        debug!("Connecting to schema index at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::ConnectionFailure(format!(
                    "Cannot open schema index {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        let index = Self { pool };
        if !index.is_initialized().await? {
            index.init_schema().await?;
        }
        Ok(index)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing schema index tables");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='indexed_databases'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Database Operations =====

    /// List active databases, newest first
    pub async fn get_indexed_databases(&self) -> Result<Vec<DatabaseSummary>> {
        let databases = sqlx::query_as::<_, DatabaseSummary>(
            r#"
            SELECT id AS database_id, engine_type, connection_name, total_tables,
                   total_schemas, indexed_at, status
            FROM indexed_databases
            WHERE status = 'active'
            ORDER BY indexed_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(databases)
    }

    /// Get a database row by ID regardless of status
    pub async fn get_database(&self, database_id: i64) -> Result<Option<IndexedDatabase>> {
        let database =
            sqlx::query_as::<_, IndexedDatabase>("SELECT * FROM indexed_databases WHERE id = ?")
                .bind(database_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(database)
    }

    /// Get a database row by ID, failing unless it is active
    pub async fn require_active(&self, database_id: i64) -> Result<IndexedDatabase> {
        let database = sqlx::query_as::<_, IndexedDatabase>(
            "SELECT * FROM indexed_databases WHERE id = ? AND status != 'deleted'",
        )
        .bind(database_id)
        .fetch_optional(&self.pool)
        .await?;
        database.ok_or(Error::DatabaseNotFound(database_id))
    }

    /// Namespace layout of a database
    ///
    /// Soft-deleted databases are still returned here; only the listing hides them.
    pub async fn get_database_schema(&self, database_id: i64) -> Result<DatabaseSchema> {
        let database = self
            .get_database(database_id)
            .await?
            .ok_or(Error::DatabaseNotFound(database_id))?;

        let schema_rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT id, schema_name, table_count FROM indexed_schemas WHERE database_id = ? ORDER BY id",
        )
        .bind(database_id)
        .fetch_all(&self.pool)
        .await?;

        let table_rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT schema_id, table_name FROM indexed_tables WHERE database_id = ? ORDER BY id",
        )
        .bind(database_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tables_by_schema: HashMap<i64, Vec<String>> = HashMap::new();
        for (schema_id, table_name) in table_rows {
            tables_by_schema.entry(schema_id).or_default().push(table_name);
        }

        let schemas = schema_rows
            .into_iter()
            .map(|(schema_id, schema_name, table_count)| SchemaSummary {
                schema_id,
                schema_name,
                table_count,
                tables: tables_by_schema.remove(&schema_id).unwrap_or_default(),
            })
            .collect();

        Ok(DatabaseSchema {
            database_id,
            connection_name: database.connection_name,
            engine_type: database.engine_type,
            total_tables: database.total_tables,
            total_schemas: database.total_schemas,
            status: database.status,
            schemas,
        })
    }

    /// Connection details of an active database
    pub async fn get_database_connection_info(&self, database_id: i64) -> Result<ConnectionInfo> {
        let database = self.require_active(database_id).await?;
        let connection_params = database.params()?;
        Ok(ConnectionInfo {
            database_id,
            engine_type: database.engine_type,
            connection_name: database.connection_name,
            connection_params,
        })
    }

    /// Soft-delete a database index
    pub async fn delete_database_index(&self, database_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE indexed_databases SET status = ? WHERE id = ?")
            .bind(DatabaseStatus::Deleted.to_string())
            .bind(database_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DatabaseNotFound(database_id));
        }
        info!(database_id, "Marked database index as deleted");
        Ok(())
    }

    // ===== Table Operations =====

    /// Full record of one table of an active database
    pub async fn get_table_details(&self, table_id: i64) -> Result<TableDetails> {
        let row = sqlx::query_as::<_, TableRow>(
            r#"
            SELECT t.id, t.database_id, t.table_name, t.full_table_name, t.row_count,
                   t.column_count, t.table_metadata, t.sample_data, t.business_description,
                   t.keywords, s.schema_name, d.connection_name
            FROM indexed_tables t
            JOIN indexed_schemas s ON t.schema_id = s.id
            JOIN indexed_databases d ON t.database_id = d.id
            WHERE t.id = ? AND d.status != 'deleted'
            "#,
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::TableNotFound(table_id))?;

        let columns = self.get_columns(table_id).await?;

        Ok(TableDetails {
            table_id: row.id,
            database_id: row.database_id,
            table_name: row.full_table_name,
            short_name: row.table_name,
            schema_name: row.schema_name,
            connection_name: row.connection_name,
            row_count: row.row_count,
            column_count: row.column_count,
            description: row.business_description,
            keywords: row.keywords,
            metadata: decode_blob(&row.table_metadata, Value::Object(Default::default())),
            sample_data: decode_blob(&row.sample_data, Value::Array(Vec::new())),
            columns,
        })
    }

    /// Columns of a table ordered by name
    pub async fn get_columns(&self, table_id: i64) -> Result<Vec<IndexedColumn>> {
        let rows = sqlx::query_as::<_, ColumnRow>(
            r#"
            SELECT column_name, data_type, is_nullable, is_primary_key, is_foreign_key,
                   sample_values, semantic_type, business_description
            FROM indexed_columns
            WHERE table_id = ?
            ORDER BY column_name
            "#,
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(IndexedColumn::from).collect())
    }

    /// Keyword search over table names, descriptions and keywords
    ///
    /// Name matches rank first, keyword matches second, description-only
    /// matches last; each group by descending row count.
    pub async fn search_tables(
        &self,
        database_id: i64,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.require_active(database_id).await?;

        let pattern = like_pattern(keyword.trim());
        let hits = sqlx::query_as::<_, SearchHit>(
            r#"
            SELECT t.id AS table_id, t.full_table_name AS table_name,
                   t.business_description AS description, t.keywords,
                   t.row_count, t.column_count, s.schema_name
            FROM indexed_tables t
            JOIN indexed_schemas s ON t.schema_id = s.id
            WHERE t.database_id = ? AND (
                LOWER(t.table_name) LIKE ? ESCAPE '\' OR
                LOWER(t.business_description) LIKE ? ESCAPE '\' OR
                LOWER(t.keywords) LIKE ? ESCAPE '\'
            )
            ORDER BY
                CASE
                    WHEN LOWER(t.table_name) LIKE ? ESCAPE '\' THEN 1
                    WHEN LOWER(t.keywords) LIKE ? ESCAPE '\' THEN 2
                    ELSE 3
                END,
                t.row_count DESC,
                t.id
            LIMIT ?
            "#,
        )
        .bind(database_id)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(hits)
    }
}
