//! Question answering and SQL utilities

use crate::config::Config;
use crate::context::ContextMode;
use crate::error::Result;
use crate::index::SchemaIndex;
use crate::llm::LlmClient;
use crate::repair::{repair_group_by, RepairAction, RepairResult};
use crate::synth::{QuerySynthesizer, Suggestions, SynthesisOutcome};
use tracing::info;

/// Options for `schemadex ask`
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Restrict the context to these table ids
    pub tables: Vec<i64>,
    /// Overrides `synthesis.context_mode` when set
    pub mode: Option<ContextMode>,
}

/// Convert a question to SQL against an indexed database
pub async fn cmd_ask(
    config: &Config,
    index: &SchemaIndex,
    llm: &dyn LlmClient,
    database_id: i64,
    question: &str,
    options: AskOptions,
) -> Result<SynthesisOutcome> {
    let mode = match options.mode {
        Some(mode) => mode,
        None => config.synthesis.context_mode()?,
    };
    info!(database_id, %mode, "Asking: {}", question);

    let synthesizer = QuerySynthesizer::new(index, llm);
    Ok(synthesizer
        .convert_query(database_id, question, &options.tables, mode)
        .await)
}

/// Run the GROUP BY repair on SQL supplied by the user
pub fn cmd_repair(sql: &str) -> RepairResult {
    repair_group_by(sql.trim())
}

pub async fn cmd_explain(
    index: &SchemaIndex,
    llm: &dyn LlmClient,
    sql: &str,
    database_id: Option<i64>,
) -> Result<String> {
    QuerySynthesizer::new(index, llm)
        .explain_query(sql, database_id)
        .await
}

pub async fn cmd_suggest(
    index: &SchemaIndex,
    llm: &dyn LlmClient,
    database_id: i64,
    sql: &str,
) -> Result<Suggestions> {
    QuerySynthesizer::new(index, llm)
        .suggest_improvements(database_id, sql)
        .await
}

pub fn print_synthesis(outcome: &SynthesisOutcome) {
    match outcome {
        SynthesisOutcome::Success(report) => {
            println!("\n{}\n", report.sql_query);
            let mark = match report.repair_action {
                RepairAction::Unchanged => "✓",
                RepairAction::ShrunkSelect | RepairAction::GrewGroupBy => "🔧",
                RepairAction::Unrepaired => "⚠",
            };
            println!("{} {}", mark, report.validation_message);
            if report.sql_query != report.generated_sql {
                println!("\nGenerated by {}:\n{}", report.model, report.generated_sql);
            }
        }
        SynthesisOutcome::Error { message } => {
            println!("✗ {}", message);
        }
    }
}

pub fn print_repair(result: &RepairResult) {
    println!("{}", result.sql);
    println!("\n{}", result.message);
}

pub fn print_suggestions(suggestions: &Suggestions) {
    if let Some(raw) = &suggestions.raw_response {
        println!("{}", raw);
        return;
    }

    let sections = [
        ("Performance", &suggestions.performance_suggestions),
        ("Readability", &suggestions.readability_improvements),
        ("Potential issues", &suggestions.potential_issues),
        ("Alternatives", &suggestions.alternative_approaches),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("\n{}:", title);
        for item in items {
            println!("  - {}", item);
        }
    }
    if !suggestions.overall_assessment.is_empty() {
        println!("\nOverall: {}", suggestions.overall_assessment);
    }
}
