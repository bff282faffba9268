use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use inference_client::InferenceProvider;
use insight_cache::SingleFlightCache;
use scenario_core::{
    AiInsight, FallbackReason, InsightSections, PortfolioSnapshot, PortfolioStore, ResultStore,
    ScenarioDefinition, ScenarioResult, SourceMode, UserProfile,
};
use scenario_engine::{ScenarioCalculator, ScenarioCatalog};
use serde::Serialize;
use tokio::sync::OwnedSemaphorePermit;

use crate::budget::MonthlyBudget;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fallback::{self, MINIMAL_DISCLAIMER, SIMILAR_DISCLAIMER, TEMPLATE_DISCLAIMER};
use crate::fingerprint::Fingerprint;
use crate::parser;
use crate::pool::InferencePool;
use crate::prompt::{PromptBuilder, PromptContext};
use crate::state::{RequestState, RequestTrace};
use crate::telemetry::{MetricsSnapshot, PipelineMetrics};
use crate::validation::{ValidationOutcome, ValidationPolicy, Validator};

/// Calculated result plus its explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioAnalysis {
    pub result: ScenarioResult,
    pub insight: AiInsight,
}

pub fn insight_key(fingerprint: &str) -> String {
    format!("insight:{}", fingerprint)
}

pub fn result_key(portfolio_id: &str, fingerprint: &str) -> String {
    format!("result:{}:{}", portfolio_id, fingerprint)
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn step(trace: &mut RequestTrace, next: RequestState) {
    // illegal moves are logged by the trace itself
    let _ = trace.advance(next);
}

struct Shared {
    config: PipelineConfig,
    calculator: ScenarioCalculator,
    provider: Arc<dyn InferenceProvider>,
    portfolios: Arc<dyn PortfolioStore>,
    result_store: Arc<dyn ResultStore>,
    insights: SingleFlightCache<AiInsight, PipelineError>,
    results: SingleFlightCache<ScenarioResult, PipelineError>,
    budget: MonthlyBudget,
    pool: InferencePool,
    metrics: PipelineMetrics,
    prompts: PromptBuilder,
    validator: Validator,
    template_validator: Validator,
}

/// Orchestrates calculation, caching, inference, validation and fallback.
///
/// Cheap to clone; all clones share caches, budget, pool and counters.
#[derive(Clone)]
pub struct InsightPipeline {
    shared: Arc<Shared>,
}

impl InsightPipeline {
    pub fn new(
        config: PipelineConfig,
        calculator: ScenarioCalculator,
        provider: Arc<dyn InferenceProvider>,
        portfolios: Arc<dyn PortfolioStore>,
        result_store: Arc<dyn ResultStore>,
    ) -> Self {
        tracing::info!(
            "Insight pipeline: provider={}, catalog={}, budget=${:.2}/month, pool={}+{}",
            provider.backend_name(),
            calculator.catalog().version(),
            config.monthly_budget_usd,
            config.max_concurrent_inferences,
            config.max_queued_inferences
        );

        Self {
            shared: Arc::new(Shared {
                insights: SingleFlightCache::new("insight", config.cache_max_entries),
                results: SingleFlightCache::new("result", config.cache_max_entries),
                budget: MonthlyBudget::new(config.monthly_budget_usd, config.cost_per_1k_tokens_usd),
                pool: InferencePool::new(config.max_concurrent_inferences, config.max_queued_inferences),
                metrics: PipelineMetrics::new(),
                prompts: PromptBuilder::new(config.insight_min_chars, config.insight_max_chars),
                validator: Validator::new(ValidationPolicy::ai(config.insight_min_chars, config.insight_max_chars)),
                template_validator: Validator::new(ValidationPolicy::structural()),
                config,
                calculator,
                provider,
                portfolios,
                result_store,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        self.shared.calculator.catalog()
    }

    /// Full analysis for a stored portfolio.
    pub async fn analyze(
        &self,
        portfolio_id: &str,
        scenario_id: &str,
        profile: UserProfile,
    ) -> PipelineResult<ScenarioAnalysis> {
        let portfolio = self.shared.portfolios.get_portfolio(portfolio_id).await?;
        self.analyze_snapshot(&portfolio, scenario_id, profile).await
    }

    /// Full analysis for a portfolio supplied by the caller.
    pub async fn analyze_snapshot(
        &self,
        portfolio: &PortfolioSnapshot,
        scenario_id: &str,
        profile: UserProfile,
    ) -> PipelineResult<ScenarioAnalysis> {
        // Input errors surface before any cache or fingerprint work
        self.shared.calculator.validate_portfolio(portfolio)?;
        let catalog = self.catalog();
        let scenario = catalog.get_scenario(scenario_id)?;

        let fingerprint = Fingerprint::compute(portfolio, scenario_id, catalog.version(), profile.experience_level);
        let result = self.cached_result(portfolio, scenario_id, &fingerprint).await?;
        let insight = self.generate_insight(portfolio, scenario, &result, profile).await?;

        self.write_through(&portfolio.id, &result, &insight).await;

        Ok(ScenarioAnalysis {
            result: (*result).clone(),
            insight: (*insight).clone(),
        })
    }

    /// Calculator only, for a stored portfolio.
    pub async fn calculate(&self, portfolio_id: &str, scenario_id: &str) -> PipelineResult<ScenarioResult> {
        let portfolio = self.shared.portfolios.get_portfolio(portfolio_id).await?;
        self.calculate_snapshot(&portfolio, scenario_id)
    }

    pub fn calculate_snapshot(&self, portfolio: &PortfolioSnapshot, scenario_id: &str) -> PipelineResult<ScenarioResult> {
        Ok(self.shared.calculator.calculate(portfolio, scenario_id)?)
    }

    async fn cached_result(
        &self,
        portfolio: &PortfolioSnapshot,
        scenario_id: &str,
        fingerprint: &Fingerprint,
    ) -> PipelineResult<Arc<ScenarioResult>> {
        let key = result_key(&portfolio.id, &fingerprint.key);
        let calculator = self.shared.calculator.clone();
        let portfolio = portfolio.clone();
        let scenario_id = scenario_id.to_string();

        let result = self
            .shared
            .results
            .get_or_compute(&key, self.shared.config.result_ttl(), move || async move {
                calculator
                    .calculate(&portfolio, &scenario_id)
                    .map_err(PipelineError::from)
            })
            .await?;
        Ok(result)
    }

    /// Insight for a calculated result. Always completes with some insight unless the
    /// inference pool is saturated.
    pub async fn generate_insight(
        &self,
        portfolio: &PortfolioSnapshot,
        scenario: &ScenarioDefinition,
        result: &ScenarioResult,
        profile: UserProfile,
    ) -> PipelineResult<Arc<AiInsight>> {
        let shared = &self.shared;
        shared.metrics.record_request();

        let fingerprint = Fingerprint::compute(portfolio, &scenario.id, &result.catalog_version, profile.experience_level);
        let key = insight_key(&fingerprint.key);
        let mut trace = RequestTrace::new(fingerprint.key.get(..12).unwrap_or(&fingerprint.key));

        if let Some(hit) = shared.insights.peek(&key) {
            shared.metrics.record_cache(true);
            step(&mut trace, RequestState::CacheHit);
            step(&mut trace, RequestState::Completed);
            return Ok(hit);
        }
        shared.metrics.record_cache(false);
        step(&mut trace, RequestState::CacheMiss);

        let ctx = PromptContext::new(
            portfolio,
            scenario,
            result,
            profile,
            self.catalog().parameters().concentration_threshold,
        );
        let flight = Arc::clone(shared);
        let insight = shared
            .insights
            .get_or_compute_with(&key, move || async move { flight.run_flight(fingerprint, ctx, trace).await })
            .await?;
        Ok(insight)
    }

    /// Drop cached results for a portfolio, e.g. after it was edited. Insights are
    /// keyed by composition, not by portfolio, and stay valid.
    pub fn invalidate_portfolio(&self, portfolio_id: &str) -> usize {
        let removed = self
            .shared
            .results
            .invalidate_prefix(&format!("result:{}:", portfolio_id));
        tracing::info!("Invalidated {} cached results for portfolio {}", removed, portfolio_id);
        removed
    }

    pub fn purge_expired(&self) -> usize {
        self.shared.insights.purge_expired() + self.shared.results.purge_expired()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let shared = &self.shared;
        shared.metrics.snapshot(
            shared.budget.spent_usd(),
            shared.budget.limit_usd(),
            shared.insights.stats(),
            shared.results.stats(),
        )
    }

    async fn write_through(&self, portfolio_id: &str, result: &ScenarioResult, insight: &AiInsight) {
        let store = &self.shared.result_store;
        if let Err(e) = store.save_result(result).await {
            tracing::warn!("Failed to persist scenario result for {}: {}", portfolio_id, e);
            self.shared.metrics.record_store_failure();
        }
        if let Err(e) = store.save_insight(portfolio_id, insight).await {
            tracing::warn!("Failed to persist insight for {}: {}", portfolio_id, e);
            self.shared.metrics.record_store_failure();
        }
    }
}

impl Shared {
    /// One single-flight computation: inference with bounded retries, then the
    /// fallback chain. Returns the insight and how long to cache it.
    async fn run_flight(
        &self,
        fingerprint: Fingerprint,
        ctx: PromptContext,
        mut trace: RequestTrace,
    ) -> PipelineResult<(AiInsight, Duration)> {
        step(&mut trace, RequestState::Prompting);
        let mut prompt = self.prompts.build(&ctx);
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        let mut permit: Option<OwnedSemaphorePermit> = None;

        let reason = loop {
            let estimate = self.budget.estimate_cost_usd(prompt.text.chars().count(), prompt.max_tokens);
            let Some(reservation) = self.budget.try_reserve(estimate) else {
                self.metrics.record_budget_denied();
                break FallbackReason::BudgetExceeded;
            };

            if permit.is_none() {
                match self.pool.acquire().await {
                    Ok(p) => permit = Some(p),
                    Err(e) => {
                        self.budget.release(reservation);
                        self.metrics.record_pool_rejected();
                        return Err(e);
                    }
                }
            }

            step(&mut trace, RequestState::Inferring);
            let started = Instant::now();
            let response = self
                .provider
                .invoke(
                    &prompt.text,
                    prompt.max_tokens,
                    self.config.temperature,
                    self.config.inference_timeout(),
                )
                .await;
            let elapsed = started.elapsed();

            let completion = match response {
                Ok(completion) => {
                    self.metrics.record_inference(elapsed, true);
                    completion
                }
                Err(e) => {
                    self.metrics.record_inference(elapsed, false);
                    self.budget.release(reservation);
                    tracing::warn!(
                        "Inference failed for {} ({}): {}",
                        fingerprint.key,
                        e.kind(),
                        e
                    );
                    break FallbackReason::ProviderError;
                }
            };
            self.budget.settle(reservation, completion.usage);
            self.metrics.record_monthly_cost(self.budget.spent_usd());

            step(&mut trace, RequestState::Validating);
            let (outcome, sections) = match parser::parse(&completion.text) {
                Ok(sections) => (self.validator.validate(&sections), Some(sections)),
                Err(issues) => (ValidationOutcome::rejected(issues), None),
            };
            self.metrics.record_validation(outcome.accepted);

            if let (true, Some(sections)) = (outcome.accepted, sections) {
                step(&mut trace, RequestState::Accepted);
                let ttl = self.config.insight_ttl();
                let insight = self.build_insight(
                    &fingerprint,
                    sections,
                    outcome.quality_score,
                    SourceMode::AiGenerated,
                    None,
                    ttl,
                );
                self.metrics.record_insight(SourceMode::AiGenerated);
                step(&mut trace, RequestState::Completed);
                tracing::info!(
                    "AI insight accepted for {} after {} attempt(s), quality {:.0}",
                    fingerprint.key,
                    attempt + 1,
                    outcome.quality_score
                );
                return Ok((insight, ttl));
            }

            step(&mut trace, RequestState::Rejected);
            let issues: Vec<String> = outcome.issues.iter().map(|i| i.to_string()).collect();
            tracing::warn!(
                "Insight for {} rejected on attempt {}: {}",
                fingerprint.key,
                attempt + 1,
                issues.join("; ")
            );

            attempt += 1;
            if attempt >= max_attempts {
                step(&mut trace, RequestState::Exhausted);
                break FallbackReason::ValidationExhausted;
            }
            step(&mut trace, RequestState::Retry);
            prompt = self.prompts.build_retry(&ctx, &outcome.issues, attempt);
        };
        drop(permit);

        step(&mut trace, RequestState::Fallback);
        let insight = self.fallback(&fingerprint, &ctx, reason);
        step(&mut trace, RequestState::Completed);
        Ok((insight, self.config.fallback_ttl()))
    }

    /// Degraded insight, first success wins: similar cached insight, template, minimal.
    fn fallback(&self, fingerprint: &Fingerprint, ctx: &PromptContext, reason: FallbackReason) -> AiInsight {
        let ttl = self.config.fallback_ttl();

        let similar = fingerprint
            .neighbours()
            .into_iter()
            .filter_map(|n| self.insights.peek(&insight_key(&n.key)))
            .find(|candidate| candidate.source_mode == SourceMode::AiGenerated);
        if let Some(similar) = similar {
            let mut insight = self.build_insight(
                fingerprint,
                similar.sections.clone(),
                similar.quality_score,
                SourceMode::CachedSimilar,
                Some(SIMILAR_DISCLAIMER),
                ttl,
            );
            insight.fallback_reason = Some(reason);
            return self.served(insight, reason);
        }

        let sections = fallback::template_sections(ctx);
        let outcome = self.template_validator.validate(&sections);
        if outcome.accepted {
            let mut insight = self.build_insight(
                fingerprint,
                sections,
                outcome.quality_score,
                SourceMode::TemplateFallback,
                Some(TEMPLATE_DISCLAIMER),
                ttl,
            );
            insight.fallback_reason = Some(reason);
            return self.served(insight, reason);
        }
        tracing::warn!(
            "Template insight for {} failed validation: {:?}",
            fingerprint.key,
            outcome.issues
        );

        let mut insight = self.build_insight(
            fingerprint,
            fallback::minimal_sections(ctx),
            0.0,
            SourceMode::MinimalFallback,
            Some(MINIMAL_DISCLAIMER),
            ttl,
        );
        insight.fallback_reason = Some(reason);
        self.served(insight, reason)
    }

    fn served(&self, insight: AiInsight, reason: FallbackReason) -> AiInsight {
        tracing::warn!(
            "Serving {} insight for {} ({})",
            insight.source_mode.as_str(),
            insight.fingerprint,
            reason.as_str()
        );
        self.metrics.record_fallback(reason, insight.source_mode);
        self.metrics.record_insight(insight.source_mode);
        insight
    }

    fn build_insight(
        &self,
        fingerprint: &Fingerprint,
        sections: InsightSections,
        quality_score: f64,
        source_mode: SourceMode,
        disclaimer: Option<&str>,
        ttl: Duration,
    ) -> AiInsight {
        let now = Utc::now();
        AiInsight {
            fingerprint: fingerprint.key.clone(),
            scenario_id: fingerprint.scenario_id.clone(),
            sections,
            quality_score,
            source_mode,
            fallback_reason: None,
            disclaimer: disclaimer.map(String::from),
            generated_at: now,
            expires_at: expiry(now, ttl),
        }
    }
}
