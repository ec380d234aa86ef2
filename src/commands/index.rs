//! Index and progress commands

use crate::config::Config;
use crate::describe::{Describer, LlmDescriber, NoDescriptions};
use crate::error::{Error, Result};
use crate::extract::{Engine, JsonDumpExtractor};
use crate::index::{IndexOptions, IndexOutcome, IndexRequest, SchemaIndex, TableOutcome};
use crate::llm::create_llm_client;
use crate::progress::{Fanout, ProgressFile, ProgressSink, ProgressSnapshot, TerminalProgress};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Options for `schemadex index`
#[derive(Debug, Clone)]
pub struct IndexCommandOptions {
    pub engine: Engine,
    pub name: String,
    /// JSON table dump written by the engine's loader
    pub tables_file: PathBuf,
    pub params: Value,
    /// Overrides `index.compact` when set
    pub compact: Option<bool>,
    /// Overrides `index.describe` when set
    pub describe: Option<bool>,
    pub show_progress: bool,
}

/// Parse `KEY=VALUE` pairs into a JSON object of connection parameters
pub fn parse_params(pairs: &[String]) -> Result<Value> {
    let mut params = Map::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::Config(format!("Invalid parameter '{}': expected KEY=VALUE", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(format!("Invalid parameter '{}': empty key", pair)));
        }
        params.insert(key.to_string(), Value::String(value.trim().to_string()));
    }
    Ok(Value::Object(params))
}

/// Run one indexing pass over a table dump
pub async fn cmd_index(
    config: &Config,
    index: &SchemaIndex,
    options: IndexCommandOptions,
) -> Result<IndexOutcome> {
    let compact = options.compact.unwrap_or(config.index.compact);
    let describe = options.describe.unwrap_or(config.index.describe);
    info!(
        engine = %options.engine,
        name = %options.name,
        compact,
        describe,
        "Indexing {:?}",
        options.tables_file
    );

    let describer: Box<dyn Describer> = if describe {
        let client = create_llm_client(&config.llm)?;
        Box::new(LlmDescriber::new(Arc::from(client)))
    } else {
        Box::new(NoDescriptions)
    };

    let extractor = JsonDumpExtractor::new(&options.tables_file);
    let request = IndexRequest::new(options.engine, options.name, options.params);
    let progress_file = ProgressFile::new(config.paths.progress_file());

    let terminal = options
        .show_progress
        .then(|| TerminalProgress::new("Indexing database..."));
    let mut sinks = Fanout::new().with(&progress_file);
    if let Some(bar) = &terminal {
        sinks = sinks.with(bar as &dyn ProgressSink);
    }

    let outcome = index
        .index_database_with_progress(
            &request,
            &extractor,
            describer.as_ref(),
            IndexOptions { compact },
            &sinks,
        )
        .await;

    if let Some(bar) = terminal {
        match &outcome {
            IndexOutcome::Success(_) => bar.finish("Database indexing completed!"),
            IndexOutcome::Error { message } => bar.abandon(&format!("Error: {}", message)),
        }
    }

    Ok(outcome)
}

/// Last progress snapshot for the session
pub fn cmd_progress(config: &Config) -> Result<Option<ProgressSnapshot>> {
    ProgressFile::read(&config.paths.progress_file())
}

pub fn print_index_outcome(outcome: &IndexOutcome) {
    match outcome {
        IndexOutcome::Success(report) => {
            println!("\n✓ Indexed '{}' (database id {})", report.connection_name, report.database_id);
            println!("  Schemas: {}", report.indexed_schemas);
            println!("  Tables:  {}", report.indexed_tables);
            println!("  Columns: {}", report.indexed_columns);
            if report.generation_failures > 0 {
                println!("  Description failures: {}", report.generation_failures);
            }
            if report.failed_tables > 0 {
                println!("\n⚠ {} table(s) stored with default metadata:", report.failed_tables);
                for table in &report.tables {
                    if let TableOutcome::Failed { error } = &table.outcome {
                        println!("  - {}: {}", table.table_name, error);
                    }
                }
            }
        }
        IndexOutcome::Error { message } => {
            println!("\n✗ Indexing failed: {}", message);
        }
    }
}

pub fn print_progress(snapshot: Option<&ProgressSnapshot>) {
    match snapshot {
        Some(snapshot) => {
            let event = &snapshot.event;
            println!(
                "{:>5.1}% {} ({}/{} tables, updated {})",
                event.percent,
                event.message,
                event.processed_tables,
                event.total_tables,
                snapshot.updated_at
            );
        }
        None => println!("No indexing progress recorded for this session."),
    }
}
