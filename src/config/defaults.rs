//! Default values for configuration

/// Default index session name
pub fn default_session() -> String {
    "default".to_string()
}

/// Default LLM provider selection
pub fn default_llm_provider() -> String {
    "auto".to_string()
}

/// Default chat model
pub fn default_llm_model() -> String {
    std::env::var("SCHEMADEX_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string())
}

/// Default API base override (none: derived from the provider)
pub fn default_llm_api_base() -> Option<String> {
    std::env::var("SCHEMADEX_LLM_API_BASE").ok()
}

/// Default environment variable holding the API key
pub fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default request timeout in seconds
pub fn default_llm_timeout() -> u64 {
    60
}

/// Default retry count for transient HTTP failures
pub fn default_llm_retries() -> usize {
    2
}

/// Default sampling temperature
pub fn default_llm_temperature() -> f32 {
    0.0
}

/// Default OpenAI-compatible API base
pub fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Default Ollama API base
pub fn default_ollama_api_base() -> String {
    "http://localhost:11434".to_string()
}

/// Default: full-fidelity indexing
pub fn default_index_compact() -> bool {
    false
}

/// Default: no generated descriptions
pub fn default_index_describe() -> bool {
    false
}

/// Default SQLite busy timeout in seconds
pub fn default_busy_timeout() -> u64 {
    60
}

/// Default context mode for synthesis
pub fn default_context_mode() -> String {
    "full".to_string()
}

/// Default number of search results
pub fn default_search_limit() -> usize {
    20
}

/// Maximum number of search results
pub fn default_search_max_limit() -> usize {
    200
}

/// Default config template with comments
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# schemadex configuration

[llm]
# Provider: "auto", "openai" or "ollama".
# "auto" sends gemma*/llama* models to Ollama and everything else to OpenAI.
provider = "auto"
model = "gpt-4o-mini"
# api_base = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
timeout_secs = 60
retries = 2
temperature = 0.0

[index]
# Compact mode skips row counts, sample rows and sample values.
compact = false
# Annotate tables and columns with LLM-generated descriptions.
describe = false
busy_timeout_secs = 60

[synthesis]
# "full" includes samples and row counts, "compact" only names/types/descriptions.
context_mode = "full"

[search]
default_limit = 20
max_limit = 200
"#;
