use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{InferenceError, InferenceResult};
use crate::provider::{Completion, TokenUsage};

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChoice {
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

/// Thin client for an OpenAI-compatible `/v1/completions` endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request a single completion. `timeout` bounds this call only.
    pub async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
        timeout: Duration,
    ) -> InferenceResult<Completion> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens,
            temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .timeout(timeout)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| map_transport(e, timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(InferenceError::RateLimited);
        }
        if !status.is_success() {
            return Err(InferenceError::ServiceUnavailable(format!("Status: {}", status)));
        }

        let body = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| map_transport(e, timeout))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::InvalidResponse("response contained no choices".to_string()))?;

        if choice.text.trim().is_empty() {
            return Err(InferenceError::InvalidResponse("empty completion text".to_string()));
        }
        if choice.finish_reason.as_deref() == Some("length") {
            tracing::debug!("Completion truncated at max_tokens={}", max_tokens);
        }

        Ok(Completion {
            text: choice.text,
            usage: body.usage,
        })
    }
}

fn map_transport(e: reqwest::Error, timeout: Duration) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout(timeout)
    } else if e.is_decode() {
        InferenceError::InvalidResponse(e.to_string())
    } else {
        InferenceError::RequestFailed(e)
    }
}
