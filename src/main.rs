//! schemadex CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use schemadex::{
    commands::{
        cmd_ask, cmd_connection, cmd_context, cmd_delete, cmd_explain, cmd_index, cmd_init,
        cmd_list, cmd_progress, cmd_repair, cmd_schema, cmd_search, cmd_suggest, cmd_table,
        parse_params, print_connection, print_context, print_databases, print_index_outcome,
        print_init_report, print_progress, print_repair, print_schema, print_search_results,
        print_suggestions, print_synthesis, print_table, AskOptions, IndexCommandOptions,
    },
    config::Config,
    context::ContextMode,
    error::Result,
    extract::Engine,
    index::SchemaIndex,
    llm::{create_llm_client, LlmClient},
    progress::LogWriterFactory,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "schemadex")]
#[command(version, about = "Schema index and natural-language to SQL", long_about = None)]
struct Cli {
    /// Path to config file or data directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Index session name
    #[arg(short, long, global = true, env = "SCHEMADEX_SESSION")]
    session: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON objects
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and create the session's index
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Index a database from its loader's JSON table dump
    Index {
        /// JSON file with the table list
        tables: PathBuf,

        /// Engine type (mssql, mysql, postgres, sqlite, kusto, ...)
        #[arg(short, long)]
        engine: String,

        /// Connection label
        #[arg(short, long)]
        name: String,

        /// Connection parameter stored with the index (KEY=VALUE, repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Skip row counts and samples
        #[arg(long)]
        compact: bool,

        /// Generate table and column descriptions with the LLM
        #[arg(long)]
        describe: bool,

        /// Do not draw a progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Show the last reported indexing progress
    Progress,

    /// List active indexed databases
    List,

    /// Show schemas and tables of an indexed database
    Schema { database_id: i64 },

    /// Show one table with its columns
    Table { table_id: i64 },

    /// Search tables by keyword
    Search {
        database_id: i64,
        keyword: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the prompt context for a database
    Context {
        database_id: i64,

        /// Restrict to these table ids
        #[arg(short, long, value_delimiter = ',')]
        tables: Vec<i64>,

        /// Context mode (full or compact)
        #[arg(short, long)]
        mode: Option<ContextMode>,
    },

    /// Convert a natural-language question to SQL
    Ask {
        database_id: i64,
        question: String,

        /// Restrict to these table ids
        #[arg(short, long, value_delimiter = ',')]
        tables: Vec<i64>,

        /// Context mode (full or compact)
        #[arg(short, long)]
        mode: Option<ContextMode>,
    },

    /// Check a query's GROUP BY and repair it
    Repair {
        /// SQL text ('-' reads stdin)
        sql: String,
    },

    /// Explain a SQL query in plain language
    Explain {
        /// SQL text ('-' reads stdin)
        sql: String,

        /// Include this database's context
        #[arg(short, long)]
        database: Option<i64>,
    },

    /// Ask the LLM for improvements to a query
    Suggest {
        database_id: i64,

        /// SQL text ('-' reads stdin)
        sql: String,
    },

    /// Soft-delete an indexed database
    Delete { database_id: i64 },

    /// Show stored connection parameters
    Connection { database_id: i64 },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let fmt_layer = fmt::layer().with_writer(LogWriterFactory::default());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt_layer.json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .init();
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "schemadex", &mut std::io::stdout());
        return Ok(());
    }

    // Pure text commands need neither config nor index
    if let Commands::Repair { sql } = &cli.command {
        let result = cmd_repair(&read_sql(sql)?);
        if cli.json {
            print_json(&result)?;
        } else {
            print_repair(&result);
        }
        return Ok(());
    }

    if let Commands::Init { force } = cli.command {
        let report = cmd_init(base_dir(cli.config.as_deref()), cli.session, force).await?;
        if cli.json {
            print_json(&report)?;
        } else {
            print_init_report(&report);
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref(), cli.session.clone())?;

    if let Commands::Progress = cli.command {
        let snapshot = cmd_progress(&config)?;
        if cli.json {
            print_json(&snapshot)?;
        } else {
            print_progress(snapshot.as_ref());
        }
        return Ok(());
    }

    let index = SchemaIndex::open(&config).await?;

    match cli.command {
        Commands::Init { .. }
        | Commands::Completions { .. }
        | Commands::Repair { .. }
        | Commands::Progress => unreachable!(),

        Commands::Index {
            tables,
            engine,
            name,
            params,
            compact,
            describe,
            quiet,
        } => {
            let options = IndexCommandOptions {
                engine: engine.parse::<Engine>()?,
                name,
                tables_file: tables,
                params: parse_params(&params)?,
                compact: compact.then_some(true),
                describe: describe.then_some(true),
                show_progress: !quiet && !cli.json,
            };
            let outcome = cmd_index(&config, &index, options).await?;
            if cli.json {
                print_json(&outcome)?;
            } else {
                print_index_outcome(&outcome);
            }
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Commands::List => {
            let databases = cmd_list(&index).await?;
            if cli.json {
                print_json(&databases)?;
            } else {
                print_databases(&databases);
            }
        }

        Commands::Schema { database_id } => {
            let schema = cmd_schema(&index, database_id).await?;
            if cli.json {
                print_json(&schema)?;
            } else {
                print_schema(&schema);
            }
        }

        Commands::Table { table_id } => {
            let table = cmd_table(&index, table_id).await?;
            if cli.json {
                print_json(&table)?;
            } else {
                print_table(&table);
            }
        }

        Commands::Search {
            database_id,
            keyword,
            limit,
        } => {
            let hits = cmd_search(&config, &index, database_id, &keyword, limit).await?;
            if cli.json {
                print_json(&hits)?;
            } else {
                print_search_results(&hits);
            }
        }

        Commands::Context {
            database_id,
            tables,
            mode,
        } => {
            let context = cmd_context(&config, &index, database_id, &tables, mode).await?;
            if cli.json {
                print_json(&context)?;
            } else {
                print_context(&context);
            }
        }

        Commands::Ask {
            database_id,
            question,
            tables,
            mode,
        } => {
            let llm = llm_client(&config)?;
            let options = AskOptions { tables, mode };
            let outcome =
                cmd_ask(&config, &index, llm.as_ref(), database_id, &question, options).await?;
            if cli.json {
                print_json(&outcome)?;
            } else {
                print_synthesis(&outcome);
            }
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Explain { sql, database } => {
            let llm = llm_client(&config)?;
            let explanation = cmd_explain(&index, llm.as_ref(), &read_sql(&sql)?, database).await?;
            if cli.json {
                print_json(&serde_json::json!({ "explanation": explanation }))?;
            } else {
                println!("{}", explanation);
            }
        }

        Commands::Suggest { database_id, sql } => {
            let llm = llm_client(&config)?;
            let suggestions = cmd_suggest(&index, llm.as_ref(), database_id, &read_sql(&sql)?).await?;
            if cli.json {
                print_json(&suggestions)?;
            } else {
                print_suggestions(&suggestions);
            }
        }

        Commands::Delete { database_id } => {
            let report = cmd_delete(&index, database_id).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "✓ Database index {} ('{}') marked as deleted",
                    report.database_id, report.connection_name
                );
            }
        }

        Commands::Connection { database_id } => {
            let info = cmd_connection(&index, database_id).await?;
            if cli.json {
                print_json(&info)?;
            } else {
                print_connection(&info);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// SQL from the argument, or stdin for '-'
fn read_sql(arg: &str) -> Result<String> {
    if arg == "-" {
        Ok(std::io::read_to_string(std::io::stdin())?)
    } else {
        Ok(arg.to_string())
    }
}

fn llm_client(config: &Config) -> Result<Box<dyn LlmClient>> {
    create_llm_client(&config.llm)
}

/// Data directory from `--config`, which may name a directory or a .toml file
fn base_dir(path: Option<&std::path::Path>) -> Option<PathBuf> {
    let path = path?;
    if path.extension().is_some_and(|e| e == "toml") {
        Some(
            path.parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir),
        )
    } else {
        Some(path.to_path_buf())
    }
}

fn load_config(path: Option<&std::path::Path>, session: Option<String>) -> Result<Config> {
    match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => Config::load(p, session),
        _ => Config::load_from(base_dir(path), session),
    }
}
