//! Anthropic messages adapter (secondary provider).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::*;
use super::{check_input_len, read_capped_body, truncate_content, ChatProvider};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// The messages API requires `max_tokens`; used when the request leaves it unset.
const FALLBACK_MAX_TOKENS: u32 = 1024;

/// Anthropic API adapter for the messages endpoint.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicAdapter {
    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::config("ANTHROPIC_API_KEY not set"))?;

        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let timeout = std::env::var("ANTHROPIC_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self::with_config(api_key, base_url, timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::config("ANTHROPIC_API_KEY is empty"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        let key_value = HeaderValue::from_str(&api_key)
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert("x-api-key", key_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct MessagesApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for AnthropicAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        check_input_len(req)?;

        let start = Instant::now();

        let messages: Vec<ApiMessage<'_>> = req
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        let api_req = MessagesApiRequest {
            model: &req.model,
            max_tokens: req.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            temperature: req.temperature,
            messages,
        };

        let response = self
            .client
            .post(self.messages_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = read_capped_body(PROVIDER, response).await?;

        let ctx = ErrorContext::new().with_status(status.as_u16());
        let ctx = match &request_id {
            Some(id) => ctx.with_request_id(id),
            None => ctx,
        };

        if !status.is_success() {
            let parsed_error = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error);
            let (message, ctx) = match parsed_error {
                Some(error) => {
                    let ctx = match error.error_type {
                        Some(code) => ctx.with_code(code),
                        None => ctx,
                    };
                    (error.message.unwrap_or_default(), ctx)
                }
                None => (format!("HTTP {}", status.as_u16()), ctx),
            };

            return Err(match status.as_u16() {
                429 => ProviderError::rate_limited(Duration::from_secs(60), ctx),
                // 529 is Anthropic's "overloaded" status.
                code => ProviderError::provider_with_context(PROVIDER, message, code >= 500, ctx),
            });
        }

        let parsed: MessagesApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid JSON: {e}"), false))?;

        let mut content = parsed
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
            .ok_or_else(|| ProviderError::provider(PROVIDER, "No text content in response", false))?;
        truncate_content(&mut content);

        let input_tokens = parsed.usage.as_ref().and_then(|u| u.input_tokens).unwrap_or(0);
        let output_tokens = parsed.usage.as_ref().and_then(|u| u.output_tokens).unwrap_or(0);

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(parsed.stop_reason),
        })
    }
}
