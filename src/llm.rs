//! Chat-completion providers.
//!
//! [`ChatModel`] is the narrow interface the conversation layer talks to:
//! a list of role-tagged messages in, one reply string out. Two hosted
//! backends are provided:
//!
//! | Config Value | Provider | Endpoint |
//! |-------------|----------|----------|
//! | `"gemini"` | [`GeminiChat`] | `POST /v1beta/models/{model}:generateContent` |
//! | `"openai"` | [`OpenAIChat`] | `POST /v1/chat/completions` |
//!
//! The sampling temperature is fixed when the client is constructed.
//! Chat calls are never retried.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::embedding::{api_key_from_env, http_client, send_with_retry};
use crate::error::{Error, Result};
use crate::models::{Role, Turn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Role of a message sent to a chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        }
    }
}

/// A hosted chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Sends `messages` and returns the model's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Create the [`ChatModel`] named by `config.provider`.
///
/// Fails with [`Error::MissingCredential`] when the API key variable is unset.
pub fn create_chat_model(config: &ChatConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => Err(Error::Config(format!("Unknown chat provider: {}", other))),
    }
}

// ============ Gemini ============

pub struct GeminiChat {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    http: reqwest::Client,
}

impl GeminiChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: api_key_from_env(&config.api_key_env)?,
            model: config.model.clone(),
            temperature: config.temperature,
            http: http_client("gemini", config.timeout_secs)?,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model.strip_prefix("models/").unwrap_or(&self.model)
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
        }],
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents = messages
            .iter()
            .filter_map(|m| match m.role {
                ChatRole::System => None,
                ChatRole::User => Some(text_content(Some("user"), &m.content)),
                ChatRole::Assistant => Some(text_content(Some("model"), &m.content)),
            })
            .collect();

        let body = GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty())
                .then(|| text_content(None, &system.join("\n\n"))),
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        debug!(model = %self.model, messages = messages.len(), "gemini generateContent");
        let url = self.generate_url();
        let response = send_with_retry("gemini", 0, || {
            self.http
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
        })
        .await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::invalid_response("gemini", e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| Error::invalid_response("gemini", "response has no candidates"))?;

        Ok(text)
    }
}

// ============ OpenAI ============

pub struct OpenAIChat {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    http: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: api_key_from_env(&config.api_key_env)?,
            model: config.model.clone(),
            temperature: config.temperature,
            http: http_client("openai", config.timeout_secs)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let wire: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();
        let body = serde_json::json!({
            "model": self.model,
            "messages": wire,
            "temperature": self.temperature,
        });

        debug!(model = %self.model, messages = messages.len(), "openai chat completion");
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let response = send_with_retry("openai", 0, || {
            self.http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let parsed: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| Error::invalid_response("openai", e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::invalid_response("openai", "response has no choices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(provider: &str, server: &MockServer, key_var: &str) -> ChatConfig {
        ChatConfig {
            provider: provider.to_string(),
            model: if provider == "gemini" {
                "gemini-2.0-flash".to_string()
            } else {
                "gpt-4o-mini".to_string()
            },
            base_url: Some(server.uri()),
            api_key_env: key_var.to_string(),
            ..ChatConfig::default()
        }
    }

    #[test]
    fn missing_key_fails_construction() {
        let cfg = ChatConfig {
            api_key_env: "PDFCHAT_TEST_UNSET_CHAT_KEY".to_string(),
            ..ChatConfig::default()
        };
        assert!(matches!(
            create_chat_model(&cfg),
            Err(Error::MissingCredential { .. })
        ));
    }

    #[test]
    fn turns_map_to_chat_roles() {
        assert_eq!(ChatMessage::from(&Turn::user("q")).role, ChatRole::User);
        assert_eq!(
            ChatMessage::from(&Turn::assistant("a")).role,
            ChatRole::Assistant
        );
    }

    #[tokio::test]
    async fn gemini_sends_system_instruction_and_temperature() {
        std::env::set_var("PDFCHAT_TEST_GEMINI_CHAT_KEY", "g-key");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]},
                    {"role": "user", "parts": [{"text": "what?"}]}
                ],
                "generationConfig": {"temperature": 0.3}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]}
                }]
            })))
            .mount(&server)
            .await;

        let chat = GeminiChat::new(&config("gemini", &server, "PDFCHAT_TEST_GEMINI_CHAT_KEY"))
            .unwrap();
        let reply = chat
            .complete(&[
                ChatMessage::system("be brief"),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::user("what?"),
            ])
            .await
            .unwrap();
        assert_eq!(reply, "Hello there");
    }

    #[tokio::test]
    async fn gemini_without_candidates_is_invalid() {
        std::env::set_var("PDFCHAT_TEST_GEMINI_CHAT_KEY2", "g-key");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let chat = GeminiChat::new(&config("gemini", &server, "PDFCHAT_TEST_GEMINI_CHAT_KEY2"))
            .unwrap();
        let err = chat.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn openai_reply_is_first_choice() {
        std::env::set_var("PDFCHAT_TEST_OPENAI_CHAT_KEY", "sk-chat");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-chat"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hey"}}]
            })))
            .mount(&server)
            .await;

        let chat = OpenAIChat::new(&config("openai", &server, "PDFCHAT_TEST_OPENAI_CHAT_KEY"))
            .unwrap();
        assert_eq!(chat.complete(&[ChatMessage::user("hi")]).await.unwrap(), "hey");
    }

    #[tokio::test]
    async fn server_error_surfaces_as_remote() {
        std::env::set_var("PDFCHAT_TEST_OPENAI_CHAT_KEY2", "sk-chat");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAIChat::new(&config("openai", &server, "PDFCHAT_TEST_OPENAI_CHAT_KEY2"))
            .unwrap();
        let err = chat.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }
}
