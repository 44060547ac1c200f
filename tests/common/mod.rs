#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use longguide::gateway::{
    ChatProvider, ChatRequest, ChatResponse, FinishReason, GenerateOptions, ProviderError,
    ProviderInit, TextGenerator,
};
use longguide::ValidationItem;

/// Generator driven by a closure over the prompt; records every call.
pub struct FnGenerator<F> {
    reply: F,
    pub calls: Mutex<Vec<(String, GenerateOptions)>>,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    pub fn new(reply: F) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> String {
        self.calls.lock().unwrap().push((prompt.to_string(), opts));
        (self.reply)(prompt)
    }
}

pub fn fenced(json: &str) -> String {
    format!("Here is my answer.\n```json\n{json}\n```")
}

pub fn items(n: usize) -> Vec<ValidationItem> {
    (0..n)
        .map(|i| ValidationItem::new(format!("source-{i}"), format!("Target {i}. Done.")))
        .collect()
}

/// Provider that fails every call and counts attempts.
#[derive(Default)]
pub struct FailingProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ChatProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::provider("failing", "upstream unavailable", true))
    }
}

/// Provider that echoes a fixed reply and records the requested model ids.
pub struct FixedProvider {
    pub name: &'static str,
    pub reply: String,
    pub models: Mutex<Vec<String>>,
}

impl FixedProvider {
    pub fn new(name: &'static str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: reply.to_string(),
            models: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatProvider for FixedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.models.lock().unwrap().push(req.model.clone());
        Ok(ChatResponse {
            content: self.reply.clone(),
            input_tokens: 1,
            output_tokens: 1,
            latency: Duration::from_millis(1),
            finish_reason: FinishReason::Stop,
        })
    }
}

pub fn provider_init<'a>(
    init: impl FnOnce() -> Result<Arc<dyn ChatProvider>, ProviderError> + 'a,
) -> ProviderInit<'a> {
    Box::new(init)
}
