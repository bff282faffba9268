use thiserror::Error;

/// Errors raised by the scenario core and its external collaborators.
///
/// `Clone` so a single failed computation can be fanned out to every caller
/// waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("Invalid portfolio: {0}")]
    InvalidPortfolio(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid scenario catalog: {0}")]
    InvalidCatalog(String),

    #[error("Portfolio not found: {0}")]
    PortfolioNotFound(String),

    #[error("Profile unavailable: {0}")]
    ProfileUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl ScenarioError {
    /// Caller-fault errors: deterministic, surfaced immediately, never retried.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ScenarioError::InvalidPortfolio(_)
                | ScenarioError::UnknownScenario(_)
                | ScenarioError::PortfolioNotFound(_)
        )
    }
}

pub type CoreResult<T> = Result<T, ScenarioError>;
