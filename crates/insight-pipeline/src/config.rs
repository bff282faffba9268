use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Tunables for the insight pipeline, read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Cache lifetimes
    pub insight_ttl_secs: u64,       // 24h for accepted AI insights
    pub result_ttl_secs: u64,        // 24h for calculator results
    pub fallback_ttl_secs: u64,      // 1h so inference is retried sooner
    pub cache_max_entries: usize,

    // Inference
    pub inference_timeout_secs: u64,
    pub max_retries: u32,            // re-prompts after a validation rejection
    pub temperature: f64,

    // Cost control
    pub monthly_budget_usd: f64,
    pub cost_per_1k_tokens_usd: f64,

    // Worker pool
    pub max_concurrent_inferences: usize,
    pub max_queued_inferences: usize,

    // Validation window (characters)
    pub insight_min_chars: usize,
    pub insight_max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            insight_ttl_secs: 86_400,
            result_ttl_secs: 86_400,
            fallback_ttl_secs: 3_600,
            cache_max_entries: 10_000,
            inference_timeout_secs: 30,
            max_retries: 2,
            temperature: 0.3,
            monthly_budget_usd: 250.0,
            cost_per_1k_tokens_usd: 0.01,
            max_concurrent_inferences: 8,
            max_queued_inferences: 32,
            insight_min_chars: 800,
            insight_max_chars: 2_500,
        }
    }
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let config = Self {
            insight_ttl_secs: var_or("INSIGHT_TTL_SECS", d.insight_ttl_secs)?,
            result_ttl_secs: var_or("RESULT_TTL_SECS", d.result_ttl_secs)?,
            fallback_ttl_secs: var_or("FALLBACK_TTL_SECS", d.fallback_ttl_secs)?,
            cache_max_entries: var_or("CACHE_MAX_ENTRIES", d.cache_max_entries)?,
            inference_timeout_secs: var_or("INFERENCE_TIMEOUT_SECS", d.inference_timeout_secs)?,
            max_retries: var_or("INFERENCE_MAX_RETRIES", d.max_retries)?,
            temperature: var_or("INFERENCE_TEMPERATURE", d.temperature)?,
            monthly_budget_usd: var_or("MONTHLY_BUDGET_USD", d.monthly_budget_usd)?,
            cost_per_1k_tokens_usd: var_or("COST_PER_1K_TOKENS_USD", d.cost_per_1k_tokens_usd)?,
            max_concurrent_inferences: var_or("MAX_CONCURRENT_INFERENCES", d.max_concurrent_inferences)?,
            max_queued_inferences: var_or("MAX_QUEUED_INFERENCES", d.max_queued_inferences)?,
            insight_min_chars: var_or("INSIGHT_MIN_CHARS", d.insight_min_chars)?,
            insight_max_chars: var_or("INSIGHT_MAX_CHARS", d.insight_max_chars)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inference_timeout_secs == 0 {
            anyhow::bail!("INFERENCE_TIMEOUT_SECS must be greater than zero");
        }
        if self.max_concurrent_inferences == 0 {
            anyhow::bail!("MAX_CONCURRENT_INFERENCES must be greater than zero");
        }
        if self.insight_min_chars >= self.insight_max_chars {
            anyhow::bail!(
                "INSIGHT_MIN_CHARS ({}) must be below INSIGHT_MAX_CHARS ({})",
                self.insight_min_chars,
                self.insight_max_chars
            );
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("INFERENCE_TEMPERATURE must be within [0, 2]");
        }
        if self.monthly_budget_usd < 0.0 || self.cost_per_1k_tokens_usd < 0.0 {
            anyhow::bail!("budget and token cost must be non-negative");
        }
        Ok(())
    }

    pub fn insight_ttl(&self) -> Duration {
        Duration::from_secs(self.insight_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.insight_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.inference_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_inverted_length_window_rejected() {
        let config = PipelineConfig {
            insight_min_chars: 3000,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
