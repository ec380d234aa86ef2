//! Indexing pass: extractor output into the schema index

use super::{DatabaseStatus, SchemaIndex};
use crate::describe::{ColumnContext, Describer, TableContext, TableDescription};
use crate::error::Result;
use crate::extract::{Engine, MetadataExtractor, TableDescriptor, TableMetadata};
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Acquire, Sqlite, SqliteConnection, Transaction};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Maximum distinct sample values kept per column
pub const MAX_SAMPLE_VALUES: usize = 10;

/// Tables with more columns than this also report per-column progress
const COLUMN_PROGRESS_THRESHOLD: usize = 5;

const SETUP_DONE_PERCENT: f64 = 15.0;
const TABLES_SPAN_PERCENT: f64 = 80.0;
const FINALIZE_PERCENT: f64 = 95.0;

/// Which connection a pass indexes
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub engine: Engine,
    pub connection_label: String,
    /// Opaque to the index, stored as JSON
    pub connection_params: Value,
}

impl IndexRequest {
    pub fn new(engine: Engine, connection_label: impl Into<String>, connection_params: Value) -> Self {
        Self {
            engine,
            connection_label: connection_label.into(),
            connection_params,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Skip row counts, sample rows, raw metadata and sample values
    pub compact: bool,
}

/// Per-table result of a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TableOutcome {
    Indexed,
    /// Recorded with default metadata after its own writes were rolled back
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub table_name: String,
    pub columns: usize,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub database_id: i64,
    pub connection_name: String,
    pub indexed_tables: usize,
    pub indexed_columns: usize,
    pub indexed_schemas: usize,
    pub failed_tables: usize,
    /// Description calls that failed; their fields were left empty
    pub generation_failures: usize,
    pub tables: Vec<TableResult>,
}

/// Status-tagged result of an indexing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndexOutcome {
    Success(IndexReport),
    Error { message: String },
}

impl IndexOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IndexOutcome::Success(_))
    }
}

/// Keeps reported progress non-decreasing
struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<f64>,
}

impl<'a> ProgressTracker<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(0.0),
        }
    }

    fn report(&self, percent: f64, message: impl Into<String>, total: usize, processed: usize) {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let percent = percent.max(*last);
        *last = percent;
        self.sink
            .report(&ProgressEvent::new(percent, message, total, processed));
    }

    /// Terminal error event, reported at 0%
    fn fail(&self, message: &str) {
        self.sink
            .report(&ProgressEvent::new(0.0, format!("Error: {}", message), 0, 0));
    }
}

struct SchemaGroup {
    name: String,
    tables: Vec<usize>,
}

/// Group table indices by namespace, keeping first-seen order
fn group_by_schema(tables: &[TableDescriptor], engine: &Engine) -> Vec<SchemaGroup> {
    let mut groups: Vec<SchemaGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (idx, table) in tables.iter().enumerate() {
        let name = table.schema_name(engine);
        match positions.get(&name) {
            Some(&pos) => groups[pos].tables.push(idx),
            None => {
                positions.insert(name.clone(), groups.len());
                groups.push(SchemaGroup {
                    name,
                    tables: vec![idx],
                });
            }
        }
    }

    groups
}

fn value_as_sample(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Distinct, non-blank stringified values of one column, in first-seen order
pub fn collect_sample_values(sample_rows: &[Map<String, Value>], column: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for row in sample_rows {
        if values.len() >= MAX_SAMPLE_VALUES {
            break;
        }
        if let Some(text) = row.get(column).and_then(value_as_sample) {
            if !values.contains(&text) {
                values.push(text);
            }
        }
    }
    values
}

/// Row written for one table, before its columns
struct TableRecord<'a> {
    database_id: i64,
    schema_id: i64,
    short_name: &'a str,
    full_name: &'a str,
    row_count: i64,
    column_count: usize,
    metadata_json: String,
    sample_json: String,
    description: String,
    keywords: String,
}

async fn insert_table(conn: &mut SqliteConnection, record: &TableRecord<'_>) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO indexed_tables
            (database_id, schema_id, table_name, full_table_name, row_count, column_count,
             table_metadata, sample_data, business_description, keywords, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.database_id)
    .bind(record.schema_id)
    .bind(record.short_name)
    .bind(record.full_name)
    .bind(record.row_count)
    .bind(record.column_count as i64)
    .bind(&record.metadata_json)
    .bind(&record.sample_json)
    .bind(&record.description)
    .bind(&record.keywords)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
async fn insert_column(
    conn: &mut SqliteConnection,
    table_id: i64,
    name: &str,
    data_type: &str,
    nullable: bool,
    sample_values: &[String],
    semantic_type: &str,
    description: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO indexed_columns
            (table_id, column_name, data_type, is_nullable, is_primary_key, is_foreign_key,
             sample_values, semantic_type, business_description)
        VALUES (?, ?, ?, ?, FALSE, FALSE, ?, ?, ?)
        "#,
    )
    .bind(table_id)
    .bind(name)
    .bind(data_type)
    .bind(nullable)
    .bind(serde_json::to_string(sample_values)?)
    .bind(semantic_type)
    .bind(description)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Shared state of one running pass
struct PassContext<'a> {
    describer: &'a dyn Describer,
    progress: &'a ProgressTracker<'a>,
    options: IndexOptions,
    database_id: i64,
    total_tables: usize,
    generation_failures: usize,
}

impl PassContext<'_> {
    fn table_percent(&self, idx: usize) -> f64 {
        SETUP_DONE_PERCENT + (idx as f64 / self.total_tables as f64) * TABLES_SPAN_PERCENT
    }

    /// Write one table and its columns; the caller owns the savepoint
    async fn write_table(
        &mut self,
        conn: &mut SqliteConnection,
        idx: usize,
        table: &TableDescriptor,
        schema_id: i64,
    ) -> Result<usize> {
        let metadata: TableMetadata = table.parse_metadata()?;
        let compact = self.options.compact;

        let sample_rows: &[Map<String, Value>] = if compact { &[] } else { &metadata.sample_rows };
        let (row_count, metadata_json, sample_json) = if compact {
            (-1, "{}".to_string(), "[]".to_string())
        } else {
            (
                metadata.row_count(),
                serde_json::to_string(&table.metadata)?,
                serde_json::to_string(&metadata.sample_rows)?,
            )
        };

        let TableDescription {
            description,
            keywords,
        } = if metadata.columns.is_empty() {
            TableDescription::default()
        } else {
            let ctx = TableContext {
                table_name: &table.name,
                columns: &metadata.columns,
                sample_rows,
            };
            match self.describer.describe_table(&ctx).await {
                Ok(described) => described,
                Err(e) => {
                    self.generation_failures += 1;
                    warn!(table = %table.name, error = %e, "Failed to generate table description");
                    TableDescription::default()
                }
            }
        };

        let table_id = insert_table(
            conn,
            &TableRecord {
                database_id: self.database_id,
                schema_id,
                short_name: table.short_name(),
                full_name: &table.name,
                row_count,
                column_count: metadata.columns.len(),
                metadata_json,
                sample_json,
                description,
                keywords,
            },
        )
        .await?;

        let column_total = metadata.columns.len();
        let base_percent = self.table_percent(idx);
        for (col_idx, column) in metadata.columns.iter().enumerate() {
            if column_total > COLUMN_PROGRESS_THRESHOLD {
                let sub = base_percent
                    + (col_idx as f64 / column_total as f64)
                        * (TABLES_SPAN_PERCENT / self.total_tables as f64);
                self.progress.report(
                    sub,
                    format!(
                        "Processing column {} in {} ({}/{})",
                        column.name,
                        table.name,
                        col_idx + 1,
                        column_total
                    ),
                    self.total_tables,
                    idx + 1,
                );
            }

            let sample_values = if compact {
                Vec::new()
            } else {
                collect_sample_values(&metadata.sample_rows, &column.name)
            };

            let ctx = ColumnContext {
                table_name: &table.name,
                column_name: &column.name,
                data_type: &column.data_type,
                sample_values: &sample_values,
            };
            let described = match self.describer.describe_column(&ctx).await {
                Ok(described) => described,
                Err(e) => {
                    self.generation_failures += 1;
                    warn!(
                        table = %table.name,
                        column = %column.name,
                        error = %e,
                        "Failed to generate column description"
                    );
                    Default::default()
                }
            };

            insert_column(
                conn,
                table_id,
                &column.name,
                &column.data_type,
                column.nullable,
                &sample_values,
                &described.semantic_type,
                &described.description,
            )
            .await?;
        }

        Ok(column_total)
    }
}

impl SchemaIndex {
    /// Index a database without progress reporting
    pub async fn index_database(
        &self,
        request: &IndexRequest,
        extractor: &dyn MetadataExtractor,
        describer: &dyn Describer,
        options: IndexOptions,
    ) -> IndexOutcome {
        self.index_database_with_progress(request, extractor, describer, options, &NoProgress)
            .await
    }

    /// Index a database, reporting non-decreasing progress to `sink`
    ///
    /// Extractor and store failures abort the pass and nothing is committed.
    /// A single table failing only rolls back that table's writes.
    pub async fn index_database_with_progress(
        &self,
        request: &IndexRequest,
        extractor: &dyn MetadataExtractor,
        describer: &dyn Describer,
        options: IndexOptions,
        sink: &dyn ProgressSink,
    ) -> IndexOutcome {
        let progress = ProgressTracker::new(sink);

        match self
            .run_pass(request, extractor, describer, options, &progress)
            .await
        {
            Ok(report) => {
                progress.report(
                    100.0,
                    "Database indexing completed!",
                    report.tables.len(),
                    report.tables.len(),
                );
                info!(
                    database_id = report.database_id,
                    tables = report.indexed_tables,
                    columns = report.indexed_columns,
                    schemas = report.indexed_schemas,
                    failed = report.failed_tables,
                    "Database indexing completed"
                );
                IndexOutcome::Success(report)
            }
            Err(e) => {
                let message = e.to_string();
                progress.fail(&message);
                error!(connection = %request.connection_label, error = %message, "Database indexing failed");
                IndexOutcome::Error { message }
            }
        }
    }

    async fn run_pass(
        &self,
        request: &IndexRequest,
        extractor: &dyn MetadataExtractor,
        describer: &dyn Describer,
        options: IndexOptions,
        progress: &ProgressTracker<'_>,
    ) -> Result<IndexReport> {
        info!(
            connection = %request.connection_label,
            engine = %request.engine,
            compact = options.compact,
            "Starting database indexing"
        );
        progress.report(5.0, "Connecting to database...", 0, 0);

        let tables = extractor.list_tables().await?;
        let total_tables = tables.len();
        progress.report(
            10.0,
            format!("Found {} tables", total_tables),
            total_tables,
            0,
        );

        let mut tx = self.pool().begin().await?;

        let database_id = sqlx::query(
            r#"
            INSERT INTO indexed_databases
                (engine_type, connection_name, connection_params, indexed_at, total_tables, total_schemas, status)
            VALUES (?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(request.engine.to_string())
        .bind(&request.connection_label)
        .bind(serde_json::to_string(&request.connection_params)?)
        .bind(Utc::now().to_rfc3339())
        .bind(DatabaseStatus::Active.to_string())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        progress.report(SETUP_DONE_PERCENT, "Processing schemas...", total_tables, 0);

        let groups = group_by_schema(&tables, &request.engine);
        let mut schema_ids: Vec<i64> = vec![0; total_tables];
        for group in &groups {
            let schema_id = sqlx::query(
                r#"
                INSERT INTO indexed_schemas (database_id, schema_name, table_count, indexed_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(database_id)
            .bind(&group.name)
            .bind(group.tables.len() as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            for &idx in &group.tables {
                schema_ids[idx] = schema_id;
            }
        }

        let mut pass = PassContext {
            describer,
            progress,
            options,
            database_id,
            total_tables,
            generation_failures: 0,
        };
        let mut results = Vec::with_capacity(total_tables);
        let mut indexed_columns = 0;

        for (idx, table) in tables.iter().enumerate() {
            progress.report(
                pass.table_percent(idx),
                format!(
                    "Processing table {} ({}/{})",
                    table.name,
                    idx + 1,
                    total_tables
                ),
                total_tables,
                idx + 1,
            );
            debug!(table = %table.name, schema_id = schema_ids[idx], "Indexing table");

            let result = self
                .index_table(&mut tx, &mut pass, idx, table, schema_ids[idx])
                .await?;
            indexed_columns += result.columns;
            results.push(result);
        }

        let failed_tables = results
            .iter()
            .filter(|r| matches!(r.outcome, TableOutcome::Failed { .. }))
            .count();

        progress.report(
            FINALIZE_PERCENT,
            "Finalizing index...",
            total_tables,
            total_tables,
        );

        sqlx::query("UPDATE indexed_databases SET total_tables = ?, total_schemas = ? WHERE id = ?")
            .bind(results.len() as i64)
            .bind(groups.len() as i64)
            .bind(database_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(IndexReport {
            database_id,
            connection_name: request.connection_label.clone(),
            indexed_tables: results.len(),
            indexed_columns,
            indexed_schemas: groups.len(),
            failed_tables,
            generation_failures: pass.generation_failures,
            tables: results,
        })
    }

    /// Index one table inside a savepoint, degrading to a bare row on failure
    async fn index_table(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        pass: &mut PassContext<'_>,
        idx: usize,
        table: &TableDescriptor,
        schema_id: i64,
    ) -> Result<TableResult> {
        let mut savepoint = Acquire::begin(&mut **tx).await?;
        match pass.write_table(&mut savepoint, idx, table, schema_id).await {
            Ok(columns) => {
                savepoint.commit().await?;
                Ok(TableResult {
                    table_name: table.name.clone(),
                    columns,
                    outcome: TableOutcome::Indexed,
                })
            }
            Err(e) => {
                savepoint.rollback().await?;
                warn!(table = %table.name, error = %e, "Table failed, recording it without metadata");

                // A failure here is a store failure and aborts the pass
                insert_table(
                    tx,
                    &TableRecord {
                        database_id: pass.database_id,
                        schema_id,
                        short_name: table.short_name(),
                        full_name: &table.name,
                        row_count: -1,
                        column_count: 0,
                        metadata_json: "{}".to_string(),
                        sample_json: "[]".to_string(),
                        description: String::new(),
                        keywords: String::new(),
                    },
                )
                .await?;

                Ok(TableResult {
                    table_name: table.name.clone(),
                    columns: 0,
                    outcome: TableOutcome::Failed {
                        error: e.to_string(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{ColumnDescription, NoDescriptions};
    use crate::error::Error;
    use crate::extract::StaticExtractor;
    use crate::index::tests::setup_test_index;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for RecordingSink {
        fn report(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl MetadataExtractor for FailingExtractor {
        async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
            Err(Error::ConnectionFailure("login timeout".to_string()))
        }
    }

    /// Describes tables, fails on columns named "Secret"
    struct FlakyDescriber;

    #[async_trait]
    impl Describer for FlakyDescriber {
        async fn describe_table(&self, ctx: &TableContext<'_>) -> Result<TableDescription> {
            Ok(TableDescription {
                description: format!("About {}", ctx.table_name),
                keywords: "finance, ledger".to_string(),
            })
        }

        async fn describe_column(&self, ctx: &ColumnContext<'_>) -> Result<ColumnDescription> {
            if ctx.column_name == "Secret" {
                return Err(Error::Generation("refused".to_string()));
            }
            Ok(ColumnDescription {
                semantic_type: "amount".to_string(),
                description: format!("{} value", ctx.column_name),
            })
        }
    }

    /// Reads the index from inside the pass, while its transaction is open
    struct ReadingDescriber {
        index: SchemaIndex,
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Describer for ReadingDescriber {
        async fn describe_table(&self, _ctx: &TableContext<'_>) -> Result<TableDescription> {
            let databases = self.index.get_indexed_databases().await?;
            self.seen.lock().unwrap().push(databases.len());
            Ok(TableDescription::default())
        }

        async fn describe_column(&self, _ctx: &ColumnContext<'_>) -> Result<ColumnDescription> {
            Ok(ColumnDescription::default())
        }
    }

    fn request() -> IndexRequest {
        IndexRequest::new(Engine::Mssql, "warehouse", json!({"server": "sql01"}))
    }

    fn ten_tables() -> Vec<TableDescriptor> {
        (0..10)
            .map(|i| {
                let columns: Vec<Value> = (0..i)
                    .map(|c| json!({"name": format!("C{}", c), "type": "int"}))
                    .collect();
                TableDescriptor::new(
                    format!("dbo.T{}", i),
                    json!({"row_count": i * 10, "columns": columns}),
                )
            })
            .collect()
    }

    #[test]
    fn test_sample_values_bounded_and_distinct() {
        let rows: Vec<Map<String, Value>> = (0..30)
            .map(|i| {
                let mut row = Map::new();
                row.insert("v".to_string(), json!(i % 12));
                row.insert("blank".to_string(), json!("  "));
                row.insert("null".to_string(), Value::Null);
                row
            })
            .collect();

        let values = collect_sample_values(&rows, "v");
        assert_eq!(values.len(), MAX_SAMPLE_VALUES);
        assert_eq!(values[0], "0");
        assert_eq!(values[9], "9");

        assert!(collect_sample_values(&rows, "blank").is_empty());
        assert!(collect_sample_values(&rows, "null").is_empty());
        assert!(collect_sample_values(&rows, "missing").is_empty());
    }

    #[test]
    fn test_sample_values_dedupe_keeps_first_seen_order() {
        let rows: Vec<Map<String, Value>> = ["b", "a", "b", "c"]
            .iter()
            .map(|v| {
                let mut row = Map::new();
                row.insert("x".to_string(), json!(v));
                row
            })
            .collect();
        assert_eq!(collect_sample_values(&rows, "x"), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_group_by_schema_first_seen_order() {
        let tables = vec![
            TableDescriptor::new("sales.A", Value::Null),
            TableDescriptor::new("B", Value::Null),
            TableDescriptor::new("sales.C", Value::Null),
        ];
        let groups = group_by_schema(&tables, &Engine::Postgres);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "sales");
        assert_eq!(groups[0].tables, vec![0, 2]);
        assert_eq!(groups[1].name, "public");
    }

    #[tokio::test]
    async fn test_index_counts_all_tables() {
        let (index, _tmp) = setup_test_index().await;
        let extractor = StaticExtractor::new(ten_tables());

        let outcome = index
            .index_database(&request(), &extractor, &NoDescriptions, IndexOptions::default())
            .await;
        let IndexOutcome::Success(report) = outcome else {
            panic!("expected success");
        };
        assert_eq!(report.indexed_tables, 10);
        assert_eq!(report.indexed_columns, 45);
        assert_eq!(report.indexed_schemas, 1);
        assert_eq!(report.failed_tables, 0);
        assert!(report
            .tables
            .iter()
            .all(|t| t.outcome == TableOutcome::Indexed));
    }

    #[tokio::test]
    async fn test_progress_non_decreasing_to_100() {
        let (index, _tmp) = setup_test_index().await;
        let extractor = StaticExtractor::new(ten_tables());
        let sink = RecordingSink::default();

        let outcome = index
            .index_database_with_progress(
                &request(),
                &extractor,
                &NoDescriptions,
                IndexOptions::default(),
                &sink,
            )
            .await;
        assert!(outcome.is_success());

        let events = sink.0.lock().unwrap();
        let percents: Vec<f64> = events.iter().map(|e| e.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
        assert_eq!(percents[0], 5.0);
        assert_eq!(*percents.last().unwrap(), 100.0);
        assert!(percents.contains(&95.0));

        // T6..T9 have more than five columns and report per column
        assert!(events
            .iter()
            .any(|e| e.message.starts_with("Processing column C0 in dbo.T6")));
        assert!(!events
            .iter()
            .any(|e| e.message.contains("Processing column C0 in dbo.T5")));
        assert_eq!(events.last().unwrap().processed_tables, 10);
    }

    #[tokio::test]
    async fn test_extractor_failure_reports_error() {
        let (index, _tmp) = setup_test_index().await;
        let sink = RecordingSink::default();

        let outcome = index
            .index_database_with_progress(
                &request(),
                &FailingExtractor,
                &NoDescriptions,
                IndexOptions::default(),
                &sink,
            )
            .await;

        let IndexOutcome::Error { message } = outcome else {
            panic!("expected error");
        };
        assert!(message.contains("login timeout"));

        let events = sink.0.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.percent, 0.0);
        assert!(last.message.contains("login timeout"));
        assert!(index.get_indexed_databases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_table_does_not_sink_pass() {
        let (index, _tmp) = setup_test_index().await;
        let extractor = StaticExtractor::from_json(&json!([
            {"name": "dbo.Good", "metadata": {"row_count": 3, "columns": [{"name": "Id", "type": "int"}]}},
            {"name": "dbo.Bad", "metadata": {"columns": "not a list"}},
            {"name": "dbo.AlsoGood", "metadata": {"columns": [{"name": "Id", "type": "int"}]}}
        ]))
        .unwrap();

        let outcome = index
            .index_database(&request(), &extractor, &NoDescriptions, IndexOptions::default())
            .await;
        let IndexOutcome::Success(report) = outcome else {
            panic!("expected success");
        };
        assert_eq!(report.indexed_tables, 3);
        assert_eq!(report.failed_tables, 1);
        assert_eq!(report.indexed_columns, 2);
        assert!(matches!(
            report.tables[1].outcome,
            TableOutcome::Failed { .. }
        ));

        let hit = index
            .search_tables(report.database_id, "Bad", 5)
            .await
            .unwrap()
            .remove(0);
        let details = index.get_table_details(hit.table_id).await.unwrap();
        assert_eq!(details.row_count, -1);
        assert!(details.columns.is_empty());
        assert_eq!(details.metadata, json!({}));
    }

    #[tokio::test]
    async fn test_compact_mode_stores_no_samples() {
        let (index, _tmp) = setup_test_index().await;
        let extractor = StaticExtractor::from_json(&json!([{
            "name": "dbo.Customers",
            "metadata": {
                "row_count": 1200,
                "columns": [{"name": "Email", "type": "nvarchar"}],
                "sample_rows": [{"Email": "a@example.com"}, {"Email": "b@example.com"}]
            }
        }]))
        .unwrap();

        let outcome = index
            .index_database(
                &request(),
                &extractor,
                &NoDescriptions,
                IndexOptions { compact: true },
            )
            .await;
        let IndexOutcome::Success(report) = outcome else {
            panic!("expected success");
        };

        let hit = index
            .search_tables(report.database_id, "customers", 1)
            .await
            .unwrap()
            .remove(0);
        let details = index.get_table_details(hit.table_id).await.unwrap();
        assert_eq!(details.row_count, -1);
        assert_eq!(details.sample_data, json!([]));
        assert_eq!(details.metadata, json!({}));
        assert!(details.columns[0].sample_values.is_empty());
    }

    #[tokio::test]
    async fn test_full_mode_stores_samples() {
        let (index, _tmp) = setup_test_index().await;
        let extractor = StaticExtractor::from_json(&json!([{
            "name": "Customers",
            "metadata": {
                "row_count": 1200,
                "columns": [{"name": "Email", "type": "nvarchar"}],
                "sample_rows": [{"Email": "a@example.com"}, {"Email": "a@example.com"}, {"Email": null}]
            }
        }]))
        .unwrap();

        let outcome = index
            .index_database(&request(), &extractor, &NoDescriptions, IndexOptions::default())
            .await;
        let IndexOutcome::Success(report) = outcome else {
            panic!("expected success");
        };

        let schema = index.get_database_schema(report.database_id).await.unwrap();
        assert_eq!(schema.schemas[0].schema_name, "dbo");

        let hit = index
            .search_tables(report.database_id, "customers", 1)
            .await
            .unwrap()
            .remove(0);
        let details = index.get_table_details(hit.table_id).await.unwrap();
        assert_eq!(details.row_count, 1200);
        assert_eq!(details.columns[0].sample_values, vec!["a@example.com"]);
        assert_eq!(details.sample_data.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_describer_failures_leave_fields_empty() {
        let (index, _tmp) = setup_test_index().await;
        let extractor = StaticExtractor::from_json(&json!([{
            "name": "dbo.Ledger",
            "metadata": {"columns": [{"name": "Amount", "type": "money"}, {"name": "Secret", "type": "text"}]}
        }]))
        .unwrap();

        let outcome = index
            .index_database(&request(), &extractor, &FlakyDescriber, IndexOptions::default())
            .await;
        let IndexOutcome::Success(report) = outcome else {
            panic!("expected success");
        };
        assert_eq!(report.generation_failures, 1);
        assert_eq!(report.failed_tables, 0);

        let hits = index
            .search_tables(report.database_id, "ledger", 5)
            .await
            .unwrap();
        assert_eq!(hits[0].description, "About dbo.Ledger");

        let details = index.get_table_details(hits[0].table_id).await.unwrap();
        assert_eq!(details.columns[0].semantic_type, "amount");
        assert_eq!(details.columns[1].name, "Secret");
        assert_eq!(details.columns[1].description, "");
    }

    #[tokio::test]
    async fn test_readers_see_committed_state_during_pass() {
        let (index, _tmp) = setup_test_index().await;
        let describer = ReadingDescriber {
            index: index.clone(),
            seen: Mutex::new(Vec::new()),
        };
        let extractor = StaticExtractor::from_json(&json!([
            {"name": "dbo.Orders", "metadata": {"columns": [{"name": "Id", "type": "int"}]}}
        ]))
        .unwrap();

        let outcome = index
            .index_database(&request(), &extractor, &describer, IndexOptions::default())
            .await;
        assert!(outcome.is_success());

        // The open pass is invisible to readers until it commits
        assert_eq!(*describer.seen.lock().unwrap(), vec![0]);
        assert_eq!(index.get_indexed_databases().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_table_list() {
        let (index, _tmp) = setup_test_index().await;
        let sink = RecordingSink::default();
        let outcome = index
            .index_database_with_progress(
                &request(),
                &StaticExtractor::default(),
                &NoDescriptions,
                IndexOptions::default(),
                &sink,
            )
            .await;
        let IndexOutcome::Success(report) = outcome else {
            panic!("expected success");
        };
        assert_eq!(report.indexed_tables, 0);
        assert_eq!(sink.0.lock().unwrap().last().unwrap().percent, 100.0);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = IndexOutcome::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json, json!({"status": "error", "message": "boom"}));

        let result = TableResult {
            table_name: "dbo.T".to_string(),
            columns: 0,
            outcome: TableOutcome::Failed {
                error: "bad".to_string(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["error"], "bad");
    }
}
