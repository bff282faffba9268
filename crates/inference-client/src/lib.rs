pub mod completion;
pub mod error;
pub mod provider;

pub use completion::CompletionClient;
pub use error::{InferenceError, InferenceResult};
pub use provider::{Completion, HttpInferenceProvider, InferenceProvider, TokenUsage, UnavailableProvider};

use std::sync::Arc;
use std::time::Duration;

/// Configuration for the external text-generation service
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible completions endpoint. `None` disables inference.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Client-level ceiling; each call also carries its own timeout
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-3.5-turbo-instruct".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl InferenceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let timeout_secs: u64 = std::env::var("INFERENCE_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .map_err(|e| anyhow::anyhow!("INFERENCE_TIMEOUT_SECS must be an integer: {}", e))?
            .unwrap_or(defaults.timeout.as_secs());

        if timeout_secs == 0 {
            anyhow::bail!("INFERENCE_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            base_url: std::env::var("INFERENCE_URL")
                .ok()
                .map(|s| s.trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            api_key: std::env::var("INFERENCE_API_KEY").ok().filter(|s| !s.is_empty()),
            model: std::env::var("INFERENCE_MODEL").unwrap_or(defaults.model),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Build the provider described by `config`: the HTTP backend when a URL is set,
/// otherwise a provider that always reports `NotConfigured`.
pub fn build_provider(config: &InferenceConfig) -> Arc<dyn InferenceProvider> {
    match &config.base_url {
        Some(url) => {
            tracing::info!("Inference provider: {} (model {})", url, config.model);
            Arc::new(HttpInferenceProvider::new(CompletionClient::new(
                url.clone(),
                config.api_key.clone(),
                config.model.clone(),
                config.timeout,
            )))
        }
        None => {
            tracing::warn!("INFERENCE_URL not set; insights will come from the fallback chain");
            Arc::new(UnavailableProvider)
        }
    }
}
