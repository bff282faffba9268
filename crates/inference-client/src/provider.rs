use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::completion::CompletionClient;
use crate::error::{InferenceError, InferenceResult};

/// Token accounting reported by the provider, when it reports any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Raw provider output.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Backend-agnostic interface for text generation.
///
/// The pipeline treats implementations as opaque: request text in, response text out,
/// bounded by `timeout`.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> InferenceResult<Completion>;

    fn backend_name(&self) -> &'static str;
}

/// HTTP-backed implementation that delegates to [`CompletionClient`].
pub struct HttpInferenceProvider {
    client: CompletionClient,
}

impl HttpInferenceProvider {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

impl From<CompletionClient> for HttpInferenceProvider {
    fn from(client: CompletionClient) -> Self {
        Self::new(client)
    }
}

#[async_trait]
impl InferenceProvider for HttpInferenceProvider {
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> InferenceResult<Completion> {
        // reqwest enforces the timeout on the request; this also covers body streaming
        match tokio::time::timeout(timeout, self.client.complete(prompt, max_tokens, temperature, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(timeout)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

/// Used when no inference endpoint is configured. Every call fails fast.
pub struct UnavailableProvider;

#[async_trait]
impl InferenceProvider for UnavailableProvider {
    async fn invoke(&self, _prompt: &str, _max_tokens: u32, _temperature: f64, _timeout: Duration) -> InferenceResult<Completion> {
        Err(InferenceError::NotConfigured)
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
