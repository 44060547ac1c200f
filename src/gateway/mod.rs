//! Model call gateway: one `generate` surface over the OpenAI and Anthropic
//! providers, with retry, exponential backoff and a construction-time
//! fallback to the primary provider.

pub mod anthropic;
pub mod error;
pub mod openai;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use anthropic::AnthropicAdapter;
use openai::OpenAiAdapter;
use usage::ProviderCallRecord;

pub use error::{ErrorContext, ProviderError};
pub use types::*;
pub use usage::{NoopUsageSink, TracingUsageSink, UsageSink};

/// Maximum allowed response content length (1MB).
pub(crate) const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens).
pub(crate) const MAX_INPUT_CHARS: usize = 500_000;

/// Model used when a secondary-provider gateway is demoted to the primary.
pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-3.5-turbo";

// =============================================================================
// TRAITS
// =============================================================================

/// The uniform call surface every guideline component talks to.
///
/// Implementations never fail outward: an empty string means no usable
/// content was produced.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> String;
}

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

// =============================================================================
// GATEWAY
// =============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Sleep after failed attempt `n` is `retry_base_delay * 2^n`.
    pub retry_base_delay: Duration,
    /// Model id sent to the primary provider after a fallback.
    pub fallback_model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_secs(1),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }
}

/// Deferred provider construction, run at most once by [`ModelGateway::connect`].
pub type ProviderInit<'a> = Box<dyn FnOnce() -> Result<Arc<dyn ChatProvider>, ProviderError> + 'a>;

pub struct ModelGateway<U: UsageSink> {
    backend: Arc<dyn ChatProvider>,
    requested: ProviderKind,
    provider: ProviderKind,
    model: String,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

impl<U: UsageSink> std::fmt::Debug for ModelGateway<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("requested", &self.requested)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl<U: UsageSink> TextGenerator for ModelGateway<U> {
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> String {
        ModelGateway::generate(self, prompt, opts).await
    }
}

impl<U: UsageSink> ModelGateway<U> {
    /// Build a gateway for `model`, initializing provider clients from the environment.
    pub fn from_env(
        model: impl Into<String>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Result<Self, ProviderError> {
        Self::connect(
            model,
            usage_sink,
            config,
            Box::new(|| -> Result<Arc<dyn ChatProvider>, ProviderError> {
                Ok(Arc::new(OpenAiAdapter::from_env()?))
            }),
            Box::new(|| -> Result<Arc<dyn ChatProvider>, ProviderError> {
                Ok(Arc::new(AnthropicAdapter::from_env()?))
            }),
        )
    }

    /// Build a gateway with explicit provider initializers.
    ///
    /// Only the initializer for the selected provider runs. If the secondary
    /// fails to initialize, the gateway is demoted to the primary for its
    /// whole lifetime. A primary initialization failure is returned.
    pub fn connect(
        model: impl Into<String>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
        primary: ProviderInit<'_>,
        secondary: ProviderInit<'_>,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        let requested = ProviderKind::detect(&model);

        let (backend, provider, model) = match requested {
            ProviderKind::OpenAi => (primary()?, ProviderKind::OpenAi, model),
            ProviderKind::Anthropic => match secondary() {
                Ok(backend) => (backend, ProviderKind::Anthropic, model),
                Err(err) => {
                    warn!(
                        model = %model,
                        fallback_model = %config.fallback_model,
                        error = %err,
                        "secondary provider setup failed, falling back to primary"
                    );
                    (primary()?, ProviderKind::OpenAi, config.fallback_model.clone())
                }
            },
        };

        info!(
            provider = provider.as_str(),
            model = %model,
            "model gateway ready"
        );

        Ok(Self {
            backend,
            requested,
            provider,
            model,
            usage_sink,
            config,
        })
    }

    /// Wrap an already-constructed provider.
    pub fn with_provider(
        provider: ProviderKind,
        model: impl Into<String>,
        backend: Arc<dyn ChatProvider>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            backend,
            requested: provider,
            provider,
            model: model.into(),
            usage_sink,
            config,
        }
    }

    /// Provider every call of this gateway goes to.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Provider the configured model name asked for.
    pub fn requested_provider(&self) -> ProviderKind {
        self.requested
    }

    /// Whether construction demoted this gateway to the primary provider.
    pub fn is_fallback(&self) -> bool {
        self.requested != self.provider
    }

    /// Model id sent to the provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str, opts: GenerateOptions) -> String {
        let req = ChatRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .temperature(opts.temperature)
            .max_tokens(opts.max_output_tokens);

        for attempt in 0..=opts.max_retries {
            match self.backend.chat(&req).await {
                Ok(resp) => {
                    let record = ProviderCallRecord::new(self.backend.name(), &self.model, attempt)
                        .tokens(resp.input_tokens, resp.output_tokens)
                        .latency(resp.latency.as_millis() as u64);
                    self.usage_sink.record(record).await;
                    return resp.content;
                }
                Err(err) => {
                    let record = ProviderCallRecord::new(self.backend.name(), &self.model, attempt)
                        .error(err.code())
                        .request_id(err.request_id());
                    self.usage_sink.record(record).await;

                    warn!(
                        provider = self.backend.name(),
                        attempt = attempt + 1,
                        code = err.code(),
                        transient = err.is_transient(),
                        error = %err,
                        "generation attempt failed"
                    );

                    if attempt < opts.max_retries {
                        sleep(backoff_delay(self.config.retry_base_delay, attempt)).await;
                    }
                }
            }
        }

        error!(
            provider = self.backend.name(),
            model = %self.model,
            attempts = opts.max_retries + 1,
            "all generation attempts failed"
        );
        String::new()
    }
}

/// `base * 2^attempt`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    match 2u32.checked_pow(attempt) {
        Some(multiplier) => base.checked_mul(multiplier).unwrap_or(Duration::MAX),
        None => Duration::MAX,
    }
}

// =============================================================================
// SHARED ADAPTER HELPERS
// =============================================================================

/// Reject requests whose message text exceeds [`MAX_INPUT_CHARS`].
pub(crate) fn check_input_len(req: &ChatRequest) -> Result<(), ProviderError> {
    let total_chars: usize = req.messages.iter().map(|m| m.content.chars().count()).sum();
    if total_chars > MAX_INPUT_CHARS {
        return Err(ProviderError::invalid_request(format!(
            "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
        )));
    }
    Ok(())
}

/// Stream a response body, enforcing [`MAX_RESPONSE_LEN`].
pub(crate) async fn read_capped_body(
    provider: &'static str,
    mut response: reqwest::Response,
) -> Result<String, ProviderError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let new_len = bytes.len() + chunk.len();
        if new_len > MAX_RESPONSE_LEN {
            return Err(ProviderError::provider(
                provider,
                format!("Response too large: {new_len} bytes"),
                false,
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Truncate content to [`MAX_RESPONSE_LEN`] on a char boundary.
pub(crate) fn truncate_content(content: &mut String) {
    if content.len() <= MAX_RESPONSE_LEN {
        return;
    }
    let mut end = MAX_RESPONSE_LEN;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content.truncate(end);
}
