//! Completion client: send a built request to a chat-completions API.
//!
//! [`CompletionClient`] owns an [`Arc<dyn ChatApi>`] rather than being one.
//! The production implementation, [`OpenAiChatApi`], speaks the OpenAI
//! `/chat/completions` wire format over `reqwest`; tests plug in a fake.
//!
//! No retries happen here. A 429 surfaces as
//! [`ExtractError::RateLimitExceeded`] with the server's `Retry-After` hint
//! and the caller decides whether to wait.

use crate::config::{ExtractionConfig, DEFAULT_API_BASE_URL};
use crate::error::ExtractError;
use crate::pipeline::request::{ContentPart, Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

// ── Wire types ───────────────────────────────────────────────────────────

/// Body of `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(model: &str, messages: &[Message], max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: Vec<WirePart>,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role,
            content: m.content.iter().map(WirePart::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl From<&ContentPart> for WirePart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => WirePart::Text { text: text.clone() },
            ContentPart::InlineImage { data, mime_type } => WirePart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{mime_type};base64,{data}"),
                },
            },
        }
    }
}

/// Response of `POST /chat/completions`; only the fields we read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// A single-choice response carrying `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: Some(text.into()),
                },
            }],
            usage: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

// ── API capability ───────────────────────────────────────────────────────

/// Something that can answer a chat-completion request.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn create_chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError>;
}

/// OpenAI-compatible HTTP implementation of [`ChatApi`].
pub struct OpenAiChatApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiChatApi {
    /// A missing key is not an error here; it becomes
    /// [`ExtractError::AuthError`] on the first call.
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout_secs,
        })
    }

    /// Read the key from `OPENAI_API_KEY`. The base URL is `base_url`, else
    /// `OPENAI_BASE_URL`, else the public OpenAI endpoint.
    pub fn from_env(base_url: Option<&str>, timeout_secs: u64) -> Result<Self, ExtractError> {
        let base = base_url
            .map(str::to_string)
            .or_else(|| std::env::var(BASE_URL_ENV).ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        Self::new(std::env::var(API_KEY_ENV).ok(), base, timeout_secs)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatApi for OpenAiChatApi {
    async fn create_chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ExtractError::AuthError {
            detail: format!("{API_KEY_ENV} is not set"),
        })?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ExtractError::LlmApiError {
                status: None,
                message: if e.is_timeout() {
                    format!("request timed out after {}s", self.timeout_secs)
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status.as_u16(), retry_after, &body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ExtractError::LlmApiError {
                status: Some(status.as_u16()),
                message: format!("unreadable response body: {e}"),
            })
    }
}

/// Map a non-2xx status to the error taxonomy.
pub fn error_for_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> ExtractError {
    let message = api_error_message(body);
    match status {
        401 | 403 => ExtractError::AuthError { detail: message },
        429 => ExtractError::RateLimitExceeded { retry_after_secs },
        _ => ExtractError::LlmApiError {
            status: Some(status),
            message,
        },
    }
}

/// Pull `error.message` out of an OpenAI error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b.error.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.chars().count() > 300 {
                format!("{}…", trimmed.chars().take(300).collect::<String>())
            } else {
                trimmed.to_string()
            }
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Sends requests and returns the first choice's text.
#[derive(Clone)]
pub struct CompletionClient {
    api: Arc<dyn ChatApi>,
    model: String,
    max_tokens: u32,
}

impl CompletionClient {
    pub fn new(api: Arc<dyn ChatApi>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            api,
            model: model.into(),
            max_tokens,
        }
    }

    /// Client for the OpenAI-compatible endpoint described by `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let api = OpenAiChatApi::from_env(config.api_base_url.as_deref(), config.api_timeout_secs)?;
        Ok(Self::new(Arc::new(api), &config.model, config.max_tokens))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Complete with the configured model and token bound.
    pub async fn complete_default(&self, messages: &[Message]) -> Result<String, ExtractError> {
        self.complete(messages, &self.model, self.max_tokens).await
    }

    /// Send `messages` and return the text of the first choice.
    pub async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
    ) -> Result<String, ExtractError> {
        if max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }

        let start = Instant::now();
        let request = ChatRequest::new(model, messages, max_tokens);
        let response = self.api.create_chat_completion(&request).await?;

        if let Some(usage) = response.usage {
            debug!(
                "{}: {} input tokens, {} output tokens, {:?}",
                model,
                usage.prompt_tokens,
                usage.completion_tokens,
                start.elapsed()
            );
        }

        let first = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::LlmApiError {
                status: None,
                message: "response contained no choices".into(),
            })?;

        first.message.content.ok_or_else(|| ExtractError::LlmApiError {
            status: None,
            message: "first choice has no text content".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedApi {
        response: ChatResponse,
        seen: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl ChatApi for CannedApi {
        async fn create_chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError> {
            self.seen
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            Ok(self.response.clone())
        }
    }

    fn canned(response: ChatResponse) -> Arc<CannedApi> {
        Arc::new(CannedApi {
            response,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn sample_messages() -> Vec<Message> {
        vec![
            Message {
                role: Role::System,
                content: vec![ContentPart::text("sys")],
            },
            Message {
                role: Role::User,
                content: vec![
                    ContentPart::text("usr"),
                    ContentPart::InlineImage {
                        data: "QUJD".into(),
                        mime_type: "image/png".into(),
                    },
                ],
            },
        ]
    }

    #[test]
    fn request_wire_format() {
        let req = ChatRequest::new("gpt-4o", &sample_messages(), 1000);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 1000,
                "messages": [
                    {"role": "system", "content": [{"type": "text", "text": "sys"}]},
                    {"role": "user", "content": [
                        {"type": "text", "text": "usr"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD"}}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn response_parsing_tolerates_extra_fields() {
        let body = r#"{"id":"x","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":1,"total_tokens":6}}"#;
        let r: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(r.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(r.usage.unwrap().prompt_tokens, 5);
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            error_for_status(401, None, r#"{"error":{"message":"Incorrect API key"}}"#),
            ExtractError::AuthError { detail } if detail == "Incorrect API key"
        ));
        assert!(matches!(
            error_for_status(403, None, ""),
            ExtractError::AuthError { .. }
        ));
        assert!(matches!(
            error_for_status(429, Some(12), ""),
            ExtractError::RateLimitExceeded {
                retry_after_secs: Some(12)
            }
        ));
        assert!(matches!(
            error_for_status(500, None, "upstream exploded"),
            ExtractError::LlmApiError { status: Some(500), message } if message == "upstream exploded"
        ));
    }

    #[tokio::test]
    async fn returns_first_choice_unchanged() {
        let mut response = ChatResponse::from_text("```json\n{\"a\": 1}\n```");
        response.choices.push(Choice {
            message: ChoiceMessage {
                content: Some("second".into()),
            },
        });
        let api = canned(response);
        let client = CompletionClient::new(api.clone(), "gpt-4o", 1000);

        let text = client.complete_default(&sample_messages()).await.unwrap();
        assert_eq!(text, "```json\n{\"a\": 1}\n```");

        let seen = api.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["model"], "gpt-4o");
        assert_eq!(seen[0]["max_tokens"], 1000);
    }

    #[tokio::test]
    async fn explicit_model_overrides_default() {
        let api = canned(ChatResponse::from_text("ok"));
        let client = CompletionClient::new(api.clone(), "gpt-4o", 1000);
        client
            .complete(&sample_messages(), "gpt-4.1-mini", 64)
            .await
            .unwrap();
        let seen = api.seen.lock().unwrap();
        assert_eq!(seen[0]["model"], "gpt-4.1-mini");
        assert_eq!(seen[0]["max_tokens"], 64);
    }

    #[tokio::test]
    async fn empty_choices_is_api_error() {
        let client = CompletionClient::new(canned(ChatResponse::default()), "m", 10);
        let err = client.complete_default(&sample_messages()).await.unwrap_err();
        assert!(matches!(err, ExtractError::LlmApiError { .. }));
    }

    #[tokio::test]
    async fn zero_max_tokens_is_config_error() {
        let api = canned(ChatResponse::from_text("ok"));
        let client = CompletionClient::new(api.clone(), "m", 10);
        let err = client.complete(&sample_messages(), "m", 0).await.unwrap_err();
        assert!(err.is_config_error());
        assert!(api.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_auth_error_at_first_call() {
        let api = OpenAiChatApi::new(None, "http://127.0.0.1:9/v1/", 5).unwrap();
        assert_eq!(api.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
        let req = ChatRequest::new("m", &sample_messages(), 10);
        let err = api.create_chat_completion(&req).await.unwrap_err();
        assert!(matches!(err, ExtractError::AuthError { .. }));

        let blank = OpenAiChatApi::new(Some("  ".into()), "http://127.0.0.1:9/v1", 5).unwrap();
        let err = blank.create_chat_completion(&req).await.unwrap_err();
        assert!(matches!(err, ExtractError::AuthError { .. }));
    }
}
