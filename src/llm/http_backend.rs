use super::{ChatMessage, LlmClient};
use crate::config::{LlmProvider, ResolvedLlmConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ChatResponse {
    Choices { choices: Vec<ChatChoice> },
    Message { message: ChatReply },
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        match self {
            ChatResponse::Choices { choices } => {
                choices.into_iter().next().and_then(|c| c.message.content)
            }
            ChatResponse::Message { message } => message.content,
        }
    }
}

pub struct HttpLlmClient {
    client: Client,
    base_url: Url,
    provider: LlmProvider,
    model_id: String,
    api_key: Option<String>,
    temperature: f32,
    retries: usize,
}

impl HttpLlmClient {
    pub fn new(config: &ResolvedLlmConfig) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'
        let mut base = config.api_base.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("Invalid LLM API base '{}': {}", base, e)))?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url,
            provider: config.provider,
            model_id: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            retries: config.retries,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        let path = match self.provider {
            LlmProvider::OpenAi => "chat/completions",
            LlmProvider::Ollama => "api/chat",
        };
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid LLM API URL: {}", e)))
    }

    fn build_request(&self, messages: &[ChatMessage]) -> Result<reqwest::RequestBuilder> {
        let url = self.endpoint()?;
        let request = match self.provider {
            LlmProvider::OpenAi => {
                let body = OpenAiChatRequest {
                    model: &self.model_id,
                    messages,
                    temperature: self.temperature,
                };
                let request = self.client.post(url).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            }
            LlmProvider::Ollama => {
                let body = OllamaChatRequest {
                    model: &self.model_id,
                    messages,
                    stream: false,
                    options: OllamaOptions {
                        temperature: self.temperature,
                    },
                };
                self.client.post(url).json(&body)
            }
        };
        Ok(request)
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<ChatResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request
                .try_clone()
                .ok_or_else(|| Error::Llm("Failed to clone LLM request".to_string()))?;
            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    match response.error_for_status() {
                        Ok(ok) => {
                            return ok
                                .json::<ChatResponse>()
                                .await
                                .map_err(|e| Error::Llm(format!("Malformed LLM response: {}", e)))
                        }
                        // Client errors will not improve on retry
                        Err(e) if status.is_client_error() => return Err(Error::Llm(e.to_string())),
                        Err(e) => last_err = Some(Error::Llm(e.to_string())),
                    }
                }
                Err(e) => last_err = Some(Error::Llm(e.to_string())),
            }

            if attempt < self.retries {
                debug!(attempt, "Retrying LLM request");
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Llm("LLM request failed".to_string())))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self.build_request(messages)?;
        let response = self.send_with_retry(request).await?;
        response
            .into_content()
            .ok_or_else(|| Error::Llm("LLM response has no message content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolved(provider: LlmProvider, base: &str) -> ResolvedLlmConfig {
        ResolvedLlmConfig {
            provider,
            model: "test-model".to_string(),
            api_base: base.to_string(),
            api_key: Some("sk-test".to_string()),
            timeout: Duration::from_secs(5),
            retries: 1,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_openai_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "SELECT 1"}}]
            })))
            .mount(&server)
            .await;

        let base = format!("{}/v1", server.uri());
        let client = HttpLlmClient::new(&resolved(LlmProvider::OpenAi, &base)).unwrap();
        let reply = client
            .complete(&[ChatMessage::user("one please")])
            .await
            .unwrap();
        assert_eq!(reply, "SELECT 1");
        assert_eq!(client.model_name(), "test-model");
    }

    #[tokio::test]
    async fn test_ollama_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "SELECT 2"}
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(&resolved(LlmProvider::Ollama, &server.uri())).unwrap();
        let reply = client.complete(&[ChatMessage::user("two")]).await.unwrap();
        assert_eq!(reply, "SELECT 2");
    }

    #[tokio::test]
    async fn test_server_error_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(&resolved(LlmProvider::Ollama, &server.uri())).unwrap();
        let err = client.complete(&[ChatMessage::user("x")]).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(&resolved(LlmProvider::Ollama, &server.uri())).unwrap();
        assert!(client.complete(&[ChatMessage::user("x")]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(&resolved(LlmProvider::OpenAi, &server.uri())).unwrap();
        let err = client.complete(&[ChatMessage::user("x")]).await.unwrap_err();
        assert!(err.to_string().contains("no message content"));
    }
}
