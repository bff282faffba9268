use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Inference timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by inference provider")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Inference provider not configured")]
    NotConfigured,
}

impl InferenceError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::RequestFailed(_) => "request_failed",
            InferenceError::Timeout(_) => "timeout",
            InferenceError::RateLimited => "rate_limited",
            InferenceError::ServiceUnavailable(_) => "unavailable",
            InferenceError::InvalidResponse(_) => "invalid_response",
            InferenceError::NotConfigured => "not_configured",
        }
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;
