//! Init command implementation

use crate::config::{Config, DEFAULT_CONFIG_TEMPLATE};
use crate::error::{Error, Result};
use crate::index::SchemaIndex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub config_path: PathBuf,
    pub index_path: PathBuf,
    pub session: String,
    /// False when an existing config was kept
    pub config_written: bool,
}

/// Write the default config (unless one exists) and create the session's index
pub async fn cmd_init(
    base_dir: Option<PathBuf>,
    session: Option<String>,
    force: bool,
) -> Result<InitReport> {
    let mut config = Config::default();
    config.init_paths(base_dir, session);

    let config_path = config.paths.config_file.clone();
    let config_exists = config_path.exists();
    if config_exists && !force {
        info!("Keeping existing config at {:?}", config_path);
    } else {
        std::fs::create_dir_all(&config.paths.base_dir)?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;
        info!("Wrote default config to {:?}", config_path);
    }

    // Validate whatever is on disk now
    let config = Config::load(&config_path, Some(config.paths.session.clone()))
        .map_err(|e| Error::Config(format!("{} ({})", e, config_path.display())))?;

    let index = SchemaIndex::open(&config).await?;
    if !index.is_initialized().await? {
        return Err(Error::NotInitialized);
    }

    Ok(InitReport {
        index_path: config.paths.index_db_file(),
        session: config.paths.session.clone(),
        config_path,
        config_written: force || !config_exists,
    })
}

pub fn print_init_report(report: &InitReport) {
    if report.config_written {
        println!("✓ schemadex initialized");
    } else {
        println!("✓ schemadex already configured (use --force to rewrite the config)");
    }
    println!("  Config: {}", report.config_path.display());
    println!("  Index:  {} (session '{}')", report.index_path.display(), report.session);
    println!("\nNext steps:");
    println!("  1. Set your LLM provider and model in the config file");
    println!("  2. Index a table dump: schemadex index --engine mssql --name erp tables.json");
    println!("  3. Ask a question: schemadex ask 1 \"total sales by year\"");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_index() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(Some(tmp.path().to_path_buf()), Some("t".to_string()), false)
            .await
            .unwrap();

        assert!(report.config_written);
        assert!(report.config_path.exists());
        assert_eq!(report.index_path, tmp.path().join("db_index_t.db"));
        assert!(report.index_path.exists());
    }

    #[tokio::test]
    async fn test_init_keeps_existing_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[llm]\nmodel = \"llama3.1\"\n").unwrap();

        let report = cmd_init(Some(tmp.path().to_path_buf()), None, false)
            .await
            .unwrap();
        assert!(!report.config_written);
        assert!(std::fs::read_to_string(&path).unwrap().contains("llama3.1"));

        cmd_init(Some(tmp.path().to_path_buf()), None, true)
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("gpt-4o-mini"));
    }
}
