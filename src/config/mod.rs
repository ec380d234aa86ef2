//! Configuration management for schemadex
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::context::ContextMode;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM client configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Indexing configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Query synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Table search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// LLM client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: auto, openai or ollama
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL override
    #[serde(default = "default_llm_api_base", skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient HTTP failures
    #[serde(default = "default_llm_retries")]
    pub retries: usize,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

/// Which wire protocol the LLM client speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Fully resolved LLM settings, ready to build a client
#[derive(Debug, Clone)]
pub struct ResolvedLlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub retries: usize,
    pub temperature: f32,
}

impl LlmConfig {
    /// Resolve the provider, treating "auto" by model name
    pub fn resolved_provider(&self) -> Result<LlmProvider> {
        match self.provider.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "ollama" => Ok(LlmProvider::Ollama),
            "auto" => {
                let model = self.model.to_lowercase();
                if model.starts_with("gemma") || model.starts_with("llama") {
                    Ok(LlmProvider::Ollama)
                } else {
                    Ok(LlmProvider::OpenAi)
                }
            }
            other => Err(Error::Config(format!(
                "Unsupported LLM provider '{}'; expected auto, openai or ollama",
                other
            ))),
        }
    }

    /// Resolve every setting the HTTP client needs
    pub fn resolve(&self) -> Result<ResolvedLlmConfig> {
        let provider = self.resolved_provider()?;
        let api_base = match &self.api_base {
            Some(base) if !base.trim().is_empty() => base.trim().to_string(),
            _ => match provider {
                LlmProvider::OpenAi => default_openai_api_base(),
                LlmProvider::Ollama => default_ollama_api_base(),
            },
        };
        let api_key = match provider {
            LlmProvider::OpenAi if !self.api_key_env.is_empty() => std::env::var(&self.api_key_env)
                .ok()
                .filter(|key| !key.is_empty()),
            _ => None,
        };

        Ok(ResolvedLlmConfig {
            provider,
            model: self.model.clone(),
            api_base,
            api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            temperature: self.temperature,
        })
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Skip row counts, sample rows and sample values
    #[serde(default = "default_index_compact")]
    pub compact: bool,

    /// Generate descriptions with the configured LLM
    #[serde(default = "default_index_describe")]
    pub describe: bool,

    /// SQLite busy timeout in seconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

/// Query synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Context fidelity: full or compact
    #[serde(default = "default_context_mode")]
    pub context_mode: String,
}

impl SynthesisConfig {
    pub fn context_mode(&self) -> Result<ContextMode> {
        self.context_mode.parse()
    }
}

/// Table search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Maximum results allowed
    #[serde(default = "default_search_max_limit")]
    pub max_limit: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for schemadex data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Index session name
    pub session: String,
}

impl PathsConfig {
    /// SQLite file holding the schema index for the session
    pub fn index_db_file(&self) -> PathBuf {
        self.base_dir.join(format!("db_index_{}.db", self.session))
    }

    /// JSON snapshot of the latest indexing progress for the session
    pub fn progress_file(&self) -> PathBuf {
        self.base_dir.join(format!("progress_{}.json", self.session))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_base: default_llm_api_base(),
            api_key_env: default_llm_api_key_env(),
            timeout_secs: default_llm_timeout(),
            retries: default_llm_retries(),
            temperature: default_llm_temperature(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            compact: default_index_compact(),
            describe: default_index_describe(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            context_mode: default_context_mode(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
        }
    }
}

impl Config {
    /// Get the default base directory for schemadex (~/.schemadex)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".schemadex")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>, session: Option<String>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            base_dir: base,
            session: session.unwrap_or_else(default_session),
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path, session: Option<String>) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
            session: session.unwrap_or_else(default_session),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>, session: Option<String>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir, session);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.llm.resolved_provider()?;

        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".to_string()));
        }

        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be positive".to_string()));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.index.busy_timeout_secs == 0 {
            return Err(Error::Config(
                "index.busy_timeout_secs must be positive".to_string(),
            ));
        }

        self.synthesis.context_mode()?;

        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(Error::Config(
                "search.default_limit must be between 1 and search.max_limit".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.index.busy_timeout_secs, 60);
        assert!(!config.index.compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()), None);
        config.llm.model = "llama3.1:8b".to_string();
        config.index.compact = true;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf()), None).unwrap();
        assert_eq!(loaded.llm.model, "llama3.1:8b");
        assert!(loaded.index.compact);
    }

    #[test]
    fn test_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.synthesis.context_mode, "full");
    }

    #[test]
    fn test_session_paths() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()), Some("sales".to_string()));

        assert_eq!(
            config.paths.index_db_file(),
            tmp.path().join("db_index_sales.db")
        );
        assert_eq!(
            config.paths.progress_file(),
            tmp.path().join("progress_sales.json")
        );
    }

    #[test]
    fn test_auto_provider_by_model_name() {
        let mut llm = LlmConfig::default();
        llm.provider = "auto".to_string();

        llm.model = "gemma3:4b".to_string();
        assert_eq!(llm.resolved_provider().unwrap(), LlmProvider::Ollama);

        llm.model = "llama3.1".to_string();
        assert_eq!(llm.resolved_provider().unwrap(), LlmProvider::Ollama);

        llm.model = "gpt-4o".to_string();
        assert_eq!(llm.resolved_provider().unwrap(), LlmProvider::OpenAi);
    }

    #[test]
    fn test_resolve_default_api_base() {
        let mut llm = LlmConfig::default();
        llm.api_base = None;
        llm.provider = "ollama".to_string();
        assert_eq!(llm.resolve().unwrap().api_base, "http://localhost:11434");

        llm.provider = "openai".to_string();
        assert_eq!(llm.resolve().unwrap().api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.llm.provider = "bard".to_string();
        assert!(config.validate().is_err());
        config.llm.provider = "openai".to_string();
        assert!(config.validate().is_ok());

        config.synthesis.context_mode = "tiny".to_string();
        assert!(config.validate().is_err());
        config.synthesis.context_mode = "compact".to_string();
        assert!(config.validate().is_ok());

        config.search.default_limit = config.search.max_limit + 1;
        assert!(config.validate().is_err());
    }
}
