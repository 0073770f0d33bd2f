//! Completion Gateway
//!
//! Issues one chat-completion request per learner turn. The raw network call
//! lives behind the [`ChatClient`] trait; [`CompletionGateway`] wraps it with a
//! timeout and substitutes a canned reply on any failure, so callers always
//! receive an answer.

use crate::{error::GatewayError, fallback, message::Message, message::Role, skill::SkillTag};
use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Number of prior messages sent along with each new learner turn.
pub const HISTORY_WINDOW: usize = 10;

/// Upper bound on a single completion request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role/content pair as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: msg.content.clone(),
        }
    }
}

/// Everything the endpoint needs to answer one learner turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<ChatTurn>,
    pub user_text: String,
}

impl CompletionRequest {
    /// Builds a request from the conversation preceding the new turn, keeping
    /// only the last [`HISTORY_WINDOW`] messages.
    pub fn new(system_prompt: String, prior: &[Message], user_text: impl Into<String>) -> Self {
        let start = prior.len().saturating_sub(HISTORY_WINDOW);
        Self {
            system_prompt,
            history: prior[start..].iter().map(ChatTurn::from).collect(),
            user_text: user_text.into(),
        }
    }

    /// The full message list: system prompt, history, then the new turn.
    pub fn messages(&self) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatTurn {
            role: ChatRole::System,
            content: self.system_prompt.clone(),
        });
        messages.extend(self.history.iter().cloned());
        messages.push(ChatTurn {
            role: ChatRole::User,
            content: self.user_text.clone(),
        });
        messages
    }
}

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Network,
    Fallback,
}

/// The tutor's answer to one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub content_secondary: Option<String>,
    pub source: ReplySource,
}

/// A client able to perform a single, non-streaming chat completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the assistant text for `request`, or why it could not.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

/// Connection settings for an OpenAI-compatible completion endpoint.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Full URL of the chat-completions endpoint.
    pub url: String,
    /// Sent as a bearer credential when present.
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    messages: Vec<ChatTurn>,
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

/// An implementation of [`ChatClient`] for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client,
    config: GatewayConfig,
}

impl OpenAICompatibleClient {
    /// Creates a client whose requests are abandoned after `config.timeout`.
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Could not configure HTTP client, using defaults");
                Client::new()
            });
        Self { client, config }
    }
}

#[async_trait]
impl ChatClient for OpenAICompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let body = ChatCompletionBody {
            messages: request.messages(),
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self
            .client
            .post(&self.config.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Malformed("response has no choices".to_string()))?
            .message
            .content
            .ok_or_else(|| GatewayError::Malformed("choice has no content".to_string()))?;

        if content.trim().is_empty() {
            return Err(GatewayError::Malformed("content is empty".to_string()));
        }
        Ok(content)
    }
}

/// Wraps a [`ChatClient`] so that every call settles with a [`Reply`].
#[derive(Clone)]
pub struct CompletionGateway {
    client: Arc<dyn ChatClient>,
    timeout: Duration,
}

impl CompletionGateway {
    pub fn new(client: Arc<dyn ChatClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Requests a completion, falling back to a canned reply on any failure.
    ///
    /// `skill` and `context` select the canned reply; they do not affect the
    /// network request, which already carries them in its system prompt.
    pub async fn complete(&self, request: &CompletionRequest, skill: SkillTag, context: &str) -> Reply {
        let outcome = match tokio::time::timeout(self.timeout, self.client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(content) => {
                debug!(%skill, chars = content.len(), "Completion succeeded");
                Reply {
                    content,
                    content_secondary: None,
                    source: ReplySource::Network,
                }
            }
            Err(e) => {
                warn!(%skill, error = %e, "Completion failed, using canned reply");
                fallback::canned_reply(skill, &request.user_text, context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_with_history(n: usize) -> CompletionRequest {
        let prior: Vec<Message> = (0..n)
            .map(|i| Message::user(format!("turn {i}"), SkillTag::General))
            .collect();
        CompletionRequest::new("system".to_string(), &prior, "latest")
    }

    fn config_for(server: &MockServer, api_key: Option<&str>) -> GatewayConfig {
        let mut config = GatewayConfig::new(format!("{}/v1/chat/completions", server.uri()));
        config.api_key = api_key.map(String::from);
        config.model = "test-model".to_string();
        config
    }

    fn success_body(content: &str) -> serde_json::Value {
        json!({
            "id": "cmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn test_history_is_bounded() {
        let request = request_with_history(25);
        assert_eq!(request.history.len(), HISTORY_WINDOW);
        assert_eq!(request.history[0].content, "turn 15");

        let messages = request.messages();
        assert_eq!(messages.len(), HISTORY_WINDOW + 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("latest"));
    }

    #[test]
    fn test_short_history_is_kept_whole() {
        let request = request_with_history(3);
        assert_eq!(request.history.len(), 3);
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let mut config = GatewayConfig::new("http://localhost");
        config.api_key = Some("sk-secret".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_client_sends_expected_body_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "max_tokens": 500,
                "messages": [{"role": "system", "content": "system"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAICompatibleClient::new(config_for(&server, Some("test-key")));
        let request = CompletionRequest::new("system".to_string(), &[], "hello");
        let result = client.complete(&request).await;
        assert_eq!(result.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn test_client_omits_bearer_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("ok")))
            .mount(&server)
            .await;

        let client = OpenAICompatibleClient::new(config_for(&server, None));
        let request = CompletionRequest::new("system".to_string(), &[], "hello");
        assert!(client.complete(&request).await.is_ok());

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_client_enforces_configured_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(success_body("too late"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, None);
        config.timeout = Duration::from_millis(100);
        let client = OpenAICompatibleClient::new(config);

        match client.complete(&request_with_history(0)).await {
            Err(GatewayError::Network(e)) => assert!(e.is_timeout()),
            other => panic!("Expected a network timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_maps_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = OpenAICompatibleClient::new(config_for(&server, None));
        let request = CompletionRequest::new("system".to_string(), &[], "hello");
        let err = client.complete(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status(503)));
    }

    #[tokio::test]
    async fn test_client_rejects_malformed_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("   ")))
            .mount(&server)
            .await;

        let client = OpenAICompatibleClient::new(config_for(&server, None));
        let request = CompletionRequest::new("system".to_string(), &[], "hello");
        for _ in 0..3 {
            let err = client.complete(&request).await.unwrap_err();
            assert!(matches!(err, GatewayError::Malformed(_)), "got {err:?}");
        }
    }

    #[tokio::test]
    async fn test_gateway_returns_network_reply() {
        let mut client = MockChatClient::new();
        client
            .expect_complete()
            .times(1)
            .returning(|_| Ok("Neurons are cells.".to_string()));

        let gateway = CompletionGateway::new(Arc::new(client), DEFAULT_TIMEOUT);
        let request = CompletionRequest::new("system".to_string(), &[], "hello");
        let reply = gateway.complete(&request, SkillTag::General, "Biology").await;
        assert_eq!(reply.content, "Neurons are cells.");
        assert_eq!(reply.source, ReplySource::Network);
        assert!(reply.content_secondary.is_none());
    }

    #[tokio::test]
    async fn test_gateway_falls_back_on_error() {
        let mut client = MockChatClient::new();
        client
            .expect_complete()
            .returning(|_| Err(GatewayError::Status(500)));

        let gateway = CompletionGateway::new(Arc::new(client), DEFAULT_TIMEOUT);
        let request = CompletionRequest::new("system".to_string(), &[], "quiz me");
        let reply = gateway.complete(&request, SkillTag::QuizMaster, "Biology").await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(!reply.content.is_empty());
        assert_eq!(reply, fallback::canned_reply(SkillTag::QuizMaster, "quiz me", "Biology"));
    }

    struct StalledClient;

    #[async_trait]
    impl ChatClient for StalledClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_gateway_times_out_to_fallback() {
        let gateway = CompletionGateway::new(Arc::new(StalledClient), Duration::from_millis(50));
        let request = CompletionRequest::new("system".to_string(), &[], "hello");
        let reply = gateway.complete(&request, SkillTag::General, "Biology").await;
        assert_eq!(reply.source, ReplySource::Fallback);
    }
}
