//! Read-only commands over the schema index

use crate::config::Config;
use crate::context::{ContextMode, NlpContext};
use crate::error::Result;
use crate::index::{
    ConnectionInfo, DatabaseSchema, DatabaseSummary, SchemaIndex, SearchHit, TableDetails,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of a soft delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReport {
    pub database_id: i64,
    pub connection_name: String,
    pub status: String,
}

pub async fn cmd_list(index: &SchemaIndex) -> Result<Vec<DatabaseSummary>> {
    index.get_indexed_databases().await
}

pub async fn cmd_schema(index: &SchemaIndex, database_id: i64) -> Result<DatabaseSchema> {
    index.get_database_schema(database_id).await
}

pub async fn cmd_table(index: &SchemaIndex, table_id: i64) -> Result<TableDetails> {
    index.get_table_details(table_id).await
}

/// Search tables; `limit` falls back to the configured default and is capped
pub async fn cmd_search(
    config: &Config,
    index: &SchemaIndex,
    database_id: i64,
    keyword: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    let limit = limit
        .unwrap_or(config.search.default_limit)
        .clamp(1, config.search.max_limit);
    info!(database_id, keyword, limit, "Searching tables");
    index.search_tables(database_id, keyword, limit).await
}

pub async fn cmd_context(
    config: &Config,
    index: &SchemaIndex,
    database_id: i64,
    tables: &[i64],
    mode: Option<ContextMode>,
) -> Result<NlpContext> {
    let mode = match mode {
        Some(mode) => mode,
        None => config.synthesis.context_mode()?,
    };
    index.get_context(database_id, tables, mode).await
}

pub async fn cmd_connection(index: &SchemaIndex, database_id: i64) -> Result<ConnectionInfo> {
    index.get_database_connection_info(database_id).await
}

/// Soft-delete a database index
pub async fn cmd_delete(index: &SchemaIndex, database_id: i64) -> Result<DeleteReport> {
    index.delete_database_index(database_id).await?;
    let schema = index.get_database_schema(database_id).await?;
    Ok(DeleteReport {
        database_id,
        connection_name: schema.connection_name,
        status: schema.status,
    })
}

pub fn print_databases(databases: &[DatabaseSummary]) {
    if databases.is_empty() {
        println!("No indexed databases. Run 'schemadex index' to add one.");
        return;
    }

    println!("\n🗄  Indexed databases\n");
    for db in databases {
        println!("  [{}] {} ({})", db.database_id, db.connection_name, db.engine_type);
        println!(
            "      {} tables in {} schemas, indexed {}",
            db.total_tables, db.total_schemas, db.indexed_at
        );
    }
    println!();
}

pub fn print_schema(schema: &DatabaseSchema) {
    println!(
        "\n{} ({}, {}) - {} tables in {} schemas",
        schema.connection_name,
        schema.engine_type,
        schema.status,
        schema.total_tables,
        schema.total_schemas
    );
    for ns in &schema.schemas {
        println!("\n  {} ({} tables)", ns.schema_name, ns.table_count);
        for table in &ns.tables {
            println!("    - {}", table);
        }
    }
    println!();
}

pub fn print_table(table: &TableDetails) {
    println!("\n{} [{}] in {}", table.table_name, table.table_id, table.connection_name);
    if table.row_count >= 0 {
        println!("  Rows: {}", table.row_count);
    } else {
        println!("  Rows: unknown");
    }
    if !table.description.is_empty() {
        println!("  Description: {}", table.description);
    }
    if !table.keywords.is_empty() {
        println!("  Keywords: {}", table.keywords);
    }

    println!("\n  Columns ({}):", table.column_count);
    for col in &table.columns {
        let nullable = if col.nullable { "null" } else { "not null" };
        print!("    - {} {} {}", col.name, col.data_type, nullable);
        if !col.semantic_type.is_empty() {
            print!(" [{}]", col.semantic_type);
        }
        println!();
        if !col.sample_values.is_empty() {
            println!("        e.g. {}", col.sample_values.join(", "));
        }
    }
    println!();
}

pub fn print_search_results(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No matching tables.");
        return;
    }

    println!("\n🔍 {} matching tables\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} [{}] - {} rows, {} columns",
            i + 1,
            hit.table_name,
            hit.table_id,
            hit.row_count,
            hit.column_count
        );
        if !hit.description.is_empty() {
            println!("   {}", hit.description);
        }
    }
    println!();
}

pub fn print_context(context: &NlpContext) {
    println!(
        "\n{} ({}) - {} context, {} tables\n",
        context.database_name,
        context.engine_type,
        context.mode,
        context.tables.len()
    );
    for table in &context.tables {
        match table.row_count {
            Some(rows) => println!("{} [{}] - {} rows", table.name, table.table_id, rows),
            None => println!("{} [{}]", table.name, table.table_id),
        }
        for col in &table.columns {
            println!("  - {} ({})", col.name, col.data_type);
        }
    }
    println!();
}

pub fn print_connection(info: &ConnectionInfo) {
    println!("\n{} [{}] ({})", info.connection_name, info.database_id, info.engine_type);
    match serde_json::to_string_pretty(&info.connection_params) {
        Ok(params) => println!("{}", params),
        Err(_) => println!("{}", info.connection_params),
    }
}
