//! SQLite schema definition

/// SQL schema for the schema index database
pub const SCHEMA_SQL: &str = r#"
-- Databases: one row per indexing pass over a connection
CREATE TABLE IF NOT EXISTS indexed_databases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    engine_type TEXT NOT NULL,
    connection_name TEXT NOT NULL,
    connection_params TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    total_tables INTEGER NOT NULL DEFAULT 0,
    total_schemas INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active'
);

-- Schemas: namespaces within a database
CREATE TABLE IF NOT EXISTS indexed_schemas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    database_id INTEGER NOT NULL REFERENCES indexed_databases(id),
    schema_name TEXT NOT NULL,
    table_count INTEGER NOT NULL DEFAULT 0,
    indexed_at TEXT NOT NULL
);

-- Tables: one relation each, linked to both schema and database
CREATE TABLE IF NOT EXISTS indexed_tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    database_id INTEGER NOT NULL REFERENCES indexed_databases(id),
    schema_id INTEGER NOT NULL REFERENCES indexed_schemas(id),
    table_name TEXT NOT NULL,
    full_table_name TEXT NOT NULL,
    row_count INTEGER NOT NULL DEFAULT -1,
    column_count INTEGER NOT NULL DEFAULT 0,
    table_metadata TEXT NOT NULL DEFAULT '{}',
    sample_data TEXT NOT NULL DEFAULT '[]',
    business_description TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '',
    indexed_at TEXT NOT NULL
);

-- Columns: attributes of a table
CREATE TABLE IF NOT EXISTS indexed_columns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_id INTEGER NOT NULL REFERENCES indexed_tables(id),
    column_name TEXT NOT NULL,
    data_type TEXT NOT NULL,
    is_nullable BOOLEAN NOT NULL DEFAULT TRUE,
    is_primary_key BOOLEAN NOT NULL DEFAULT FALSE,
    is_foreign_key BOOLEAN NOT NULL DEFAULT FALSE,
    sample_values TEXT NOT NULL DEFAULT '[]',
    semantic_type TEXT NOT NULL DEFAULT '',
    business_description TEXT NOT NULL DEFAULT ''
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_schemas_database ON indexed_schemas(database_id);
CREATE INDEX IF NOT EXISTS idx_tables_database ON indexed_tables(database_id);
CREATE INDEX IF NOT EXISTS idx_tables_schema ON indexed_tables(schema_id);
CREATE INDEX IF NOT EXISTS idx_columns_table ON indexed_columns(table_id);
CREATE INDEX IF NOT EXISTS idx_databases_status ON indexed_databases(status, indexed_at);
"#;
