//! Chat completion client.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use researchkit_shared::{LlmConfig, ResearchError, Result};

/// User agent sent with every completion request.
const USER_AGENT: &str = concat!("ResearchKit/", env!("CARGO_PKG_VERSION"));

/// Text-in, text-out chat completion.
pub trait ChatModel: Send + Sync {
    /// Run one completion with a system prompt and a user prompt.
    fn chat(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;
}

impl<M: ChatModel> ChatModel for &M {
    fn chat(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).chat(system, user)
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// OpenAI-compatible `/chat/completions` client (OpenRouter by default).
#[derive(Clone)]
pub struct OpenRouterChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterChat {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResearchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatModel for OpenRouterChat {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = user.len()))]
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResearchError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ResearchError::Network(format!("{}: body read failed: {e}", self.endpoint)))?;

        if !status.is_success() {
            let head: String = raw.chars().take(300).collect();
            return Err(ResearchError::Llm(format!("HTTP {status}: {head}")));
        }

        let root: Value = serde_json::from_str(&raw)
            .map_err(|e| ResearchError::Llm(format!("invalid completion JSON: {e}")))?;

        let content = extract_assistant_content(&root)
            .ok_or_else(|| ResearchError::Llm("completion had no assistant content".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

/// Assistant text from an OpenAI-compatible response: `choices[0].message.content`
/// as a string or an array of text blocks.
pub fn extract_assistant_content(root: &Value) -> Option<String> {
    let choice = root.get("choices")?.as_array()?.first()?;
    let content = choice.get("message")?.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    let blocks = content.as_array()?;
    let joined: String = blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn content_from_string_or_blocks() {
        let plain = json!({"choices":[{"message":{"content":"hello"}}]});
        assert_eq!(extract_assistant_content(&plain).as_deref(), Some("hello"));

        let blocks = json!({"choices":[{"message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}]});
        assert_eq!(extract_assistant_content(&blocks).as_deref(), Some("ab"));

        assert!(extract_assistant_content(&json!({"choices":[]})).is_none());
    }

    #[tokio::test]
    async fn chat_posts_messages_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "summary text"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenRouterChat::new(&config(server.uri()), "sk-test").unwrap();
        let reply = chat.chat("You summarize.", "Some page").await.unwrap();
        assert_eq!(reply, "summary text");
    }

    #[tokio::test]
    async fn http_error_becomes_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let chat = OpenRouterChat::new(&config(server.uri()), "sk-test").unwrap();
        let err = chat.chat("s", "u").await.unwrap_err();
        assert!(matches!(err, ResearchError::Llm(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let chat = OpenRouterChat::new(&config(server.uri()), "k").unwrap();
        assert!(chat.chat("s", "u").await.is_err());
    }
}
