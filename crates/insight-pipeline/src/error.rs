use insight_cache::CacheError;
use scenario_core::ScenarioError;
use thiserror::Error;

/// Errors visible to callers of the pipeline. Provider failures and quality problems
/// never show up here; the fallback chain absorbs them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid portfolio, unknown scenario or unknown portfolio id
    #[error(transparent)]
    Input(ScenarioError),

    /// A collaborator (portfolio store, profile service) failed
    #[error("Collaborator failure: {0}")]
    Collaborator(ScenarioError),

    #[error("Inference pool saturated ({in_flight} running, {queued} queued); retry in {retry_after_secs}s")]
    Saturated {
        in_flight: usize,
        queued: usize,
        retry_after_secs: u64,
    },

    #[error("Shared computation for {0} ended without a result")]
    Aborted(String),
}

impl PipelineError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Saturated { .. } | PipelineError::Aborted(_) | PipelineError::Collaborator(_)
        )
    }
}

impl From<ScenarioError> for PipelineError {
    fn from(e: ScenarioError) -> Self {
        if e.is_input_error() {
            PipelineError::Input(e)
        } else {
            PipelineError::Collaborator(e)
        }
    }
}

impl From<CacheError<PipelineError>> for PipelineError {
    fn from(e: CacheError<PipelineError>) -> Self {
        match e {
            CacheError::Compute(inner) => inner,
            CacheError::Aborted { key } => PipelineError::Aborted(key),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
