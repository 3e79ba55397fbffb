//! Accountability-buddy conversation engine with model-assisted context
//! compression.
//!
//! `acbud-rs` keeps a goal-tracking dialogue with a user on top of the
//! [OpenRouter](https://openrouter.ai/) chat completions API. The core
//! abstraction is the [`TurnController`](agent::controller::TurnController), a
//! two-state machine that seeds a conversation from the user's goal, outcome
//! and obstacles, then on every following turn **compresses** the accumulated
//! context through a secondary model call before generating the next reply.
//! Only the compressed payload is carried forward, so a long-running journey
//! stays within a bounded context budget.
//!
//! # Getting started
//!
//! ```ignore
//! use acbud_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY")?)?;
//!     let controller = TurnController::new(&client, BuddyConfig::default());
//!
//!     let vars = ContextVariables::new("Run a 5K", "Feel strong", "No time");
//!     let started = controller
//!         .start_journey(&ConversationState::default(), vars)
//!         .await;
//!     println!("{}", started.reply.text());
//!
//!     let next = controller
//!         .submit_turn(&started.state, "I ran twice this week")
//!         .await;
//!     println!("{}", next.reply.text());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`TurnController`](agent::controller::TurnController), conversation state, template sets, events, per-session locking |
//! | [`context`] | Compression stage, payload extraction, size estimates |
//! | [`api`] | [`ModelInvoker`](api::invoker::ModelInvoker) trait, retry policy, scripted invoker |
//! | [`error`] | Error taxonomy shared by every stage |
//!
//! # Design principles
//!
//! 1. **State is a value.** The controller never holds conversation state; it
//!    takes a [`ConversationState`](agent::state::ConversationState) and returns
//!    a new one. Failures hand back the input unchanged.
//!
//! 2. **Compress, then generate.** Every non-initial turn runs the compression
//!    stage first and generates from its payload alone.
//!
//! 3. **Every failure is a reply.** Validation gaps, model errors and misuse
//!    become user-visible [`Reply`](agent::controller::Reply) values rather than
//!    aborting the session.

pub mod agent;
pub mod api;
pub mod context;
pub mod error;
pub mod prelude;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::api::invoker::{InvokeFuture, ModelInvoker, ModelRequest};
use crate::api::retry::{self, RetryConfig};
use crate::error::ModelCallError;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for both the compression and the generation call.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

/// Default upper bound for a single model call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    // Always serialized: 0.0 is the deterministic setting, not "unset".
    pub temperature: f32,
}

impl ChatRequest {
    /// Build the wire request for a single-prompt model call.
    pub fn from_model_request(request: &ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(Message::system(&request.system));
        }
        messages.push(Message::user(&request.prompt));
        Self {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message in the chat request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Turn an HTTP status and body into a completion or a typed error.
///
/// Split out of [`OpenRouterClient::chat`] so the response contract can be
/// checked without a network.
pub fn parse_chat_response(status: u16, text: &str) -> Result<ChatCompletion, ModelCallError> {
    if !(200..300).contains(&status) {
        return Err(ModelCallError::Http {
            status,
            body: text.to_string(),
        });
    }

    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| ModelCallError::Malformed(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ModelCallError::Api(err.message));
    }

    let choice = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ModelCallError::Malformed("response has no choices".into()))?;

    Ok(ChatCompletion {
        content: choice.message.content,
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Transport options for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Chat completions endpoint. Default: [`OPENROUTER_URL`].
    pub endpoint: String,
    /// `HTTP-Referer` header sent with every request.
    pub referer: String,
    /// `X-Title` header sent with every request.
    pub title: String,
    /// Upper bound for one HTTP round trip. Default: [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    /// Bounded retry policy for transient failures. Default: no retries.
    pub retry: RetryConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: OPENROUTER_URL.to_string(),
            referer: "https://github.com/acbud/acbud-rs".to_string(),
            title: "acbud".to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) options: ClientOptions,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default options.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ModelCallError> {
        Self::with_options(api_key, ClientOptions::default())
    }

    /// Create a new client with custom transport options.
    pub fn with_options(
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ModelCallError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelCallError::MissingCredentials(
                "API key is empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent("acbud/0.1")
            .timeout(options.timeout)
            .build()
            .map_err(|e| ModelCallError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            options,
        })
    }

    /// The transport options this client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send a single chat completion request. No retries.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, ModelCallError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let timeout = self.options.timeout;

        let resp = self
            .client
            .post(&self.options.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.options.referer)
            .header("X-Title", &self.options.title)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        let completion = parse_chat_response(status.as_u16(), &text)?;

        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        Ok(completion)
    }

    /// Run one model request under the retry policy and return trimmed text.
    pub async fn complete(&self, request: &ModelRequest) -> Result<String, ModelCallError> {
        let body = ChatRequest::from_model_request(request);
        let retry = &self.options.retry;
        let mut attempt = 0;

        loop {
            match self.chat(&body).await {
                Ok(completion) => {
                    return completion
                        .content
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .ok_or(ModelCallError::Empty);
                }
                Err(e) if retry::is_permanent(&e) => {
                    debug!("Permanent model error, not retrying: {e}");
                    return Err(e);
                }
                Err(e) if attempt < retry.max_retries && retry::is_transient(&e) => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        "Transient model error (attempt {}/{}), retrying in {:?}: {e}",
                        attempt + 1,
                        retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl ModelInvoker for OpenRouterClient {
    fn invoke<'a>(&'a self, request: &'a ModelRequest) -> InvokeFuture<'a> {
        Box::pin(self.complete(request))
    }
}

fn classify_transport_error(e: reqwest::Error, timeout: Duration) -> ModelCallError {
    if e.is_timeout() {
        ModelCallError::Timeout(timeout)
    } else {
        ModelCallError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "test-model".into(),
            system: "You are a buddy.".into(),
            prompt: "hello".into(),
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
    }

    #[test]
    fn chat_request_carries_system_and_prompt() {
        let body = ChatRequest::from_model_request(&request());
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, MessageRole::System);
        assert_eq!(body.messages[1].content, "hello");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["max_tokens"], 100);
    }

    #[test]
    fn chat_request_omits_empty_system() {
        let mut req = request();
        req.system.clear();
        let body = ChatRequest::from_model_request(&req);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, MessageRole::User);
    }

    #[test]
    fn parse_success_response() {
        let text = r#"{
            "choices": [{"message": {"content": "Hi there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        let completion = parse_chat_response(200, text).unwrap();
        assert_eq!(completion.content.as_deref(), Some("Hi there"));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, Some(13));
    }

    #[test]
    fn parse_http_error_is_typed() {
        let err = parse_chat_response(429, "rate limited").unwrap_err();
        assert_eq!(
            err,
            ModelCallError::Http {
                status: 429,
                body: "rate limited".into()
            }
        );
        assert!(retry::is_transient(&err));
    }

    #[test]
    fn parse_api_error_body() {
        let text = r#"{"error": {"message": "quota exceeded"}}"#;
        let err = parse_chat_response(200, text).unwrap_err();
        assert_eq!(err, ModelCallError::Api("quota exceeded".into()));
    }

    #[test]
    fn parse_malformed_body() {
        assert!(matches!(
            parse_chat_response(200, "not json"),
            Err(ModelCallError::Malformed(_))
        ));
        assert!(matches!(
            parse_chat_response(200, r#"{"choices": []}"#),
            Err(ModelCallError::Malformed(_))
        ));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            OpenRouterClient::new("  "),
            Err(ModelCallError::MissingCredentials(_))
        ));
    }

    #[test]
    fn client_keeps_options() {
        let options = ClientOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let client = OpenRouterClient::with_options("key", options).unwrap();
        assert_eq!(client.options().timeout, Duration::from_secs(5));
        assert_eq!(client.options().endpoint, OPENROUTER_URL);
    }
}
