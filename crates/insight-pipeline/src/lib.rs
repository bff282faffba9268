pub mod budget;
pub mod config;
pub mod error;
pub mod fallback;
pub mod fingerprint;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod prompt;
pub mod state;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod tests;

pub use budget::{MonthlyBudget, Reservation};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use fingerprint::{Fingerprint, FINGERPRINT_VERSION};
pub use pipeline::{InsightPipeline, ScenarioAnalysis};
pub use pool::InferencePool;
pub use prompt::{Prompt, PromptBuilder, PromptContext};
pub use state::{RequestState, RequestTrace};
pub use telemetry::{MetricsSnapshot, PipelineMetrics};
pub use validation::{ValidationIssue, ValidationOutcome, ValidationPolicy, Validator};
