//! LLM client abstraction
//!
//! The core only needs one synchronous request/response call. Backends:
//! - OpenAI-compatible chat completions
//! - Ollama chat

mod http_backend;

pub use http_backend::*;

use crate::config::LlmConfig;
use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").unwrap());

/// Chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Trait for chat completion backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the messages and return the text content of the reply
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// First fenced block tagged `lang` (or untagged) in a model reply
pub fn extract_code_block(content: &str, lang: &str) -> Option<String> {
    CODE_FENCE
        .captures_iter(content)
        .find(|caps| {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            tag.is_empty() || tag.eq_ignore_ascii_case(lang)
        })
        .and_then(|caps| caps.get(2))
        .map(|body| body.as_str().trim().to_string())
}

/// Create an LLM client based on configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let resolved = config.resolve()?;
    let client = HttpLlmClient::new(&resolved)?;
    Ok(Box::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage::system("be terse");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be terse");
    }

    #[test]
    fn test_extract_code_block() {
        let reply = "Here you go:\n```sql\nSELECT 1\n```\nand ```python\nprint()\n```";
        assert_eq!(extract_code_block(reply, "sql").as_deref(), Some("SELECT 1"));
        assert_eq!(extract_code_block(reply, "python").as_deref(), Some("print()"));

        let untagged = "```\nSELECT 2;\n```";
        assert_eq!(extract_code_block(untagged, "sql").as_deref(), Some("SELECT 2;"));

        assert!(extract_code_block("SELECT 3", "sql").is_none());
        assert!(extract_code_block("```json\n{}\n```", "sql").is_none());
    }

    #[test]
    fn test_create_client_rejects_unknown_provider() {
        let mut config = LlmConfig::default();
        config.provider = "carrier-pigeon".to_string();
        assert!(create_llm_client(&config).is_err());
    }
}
