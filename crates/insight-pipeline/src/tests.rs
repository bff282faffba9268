#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use inference_client::{Completion, InferenceError, InferenceProvider, InferenceResult, TokenUsage};
    use scenario_core::*;
    use scenario_engine::catalog::{CalculationParameters, CatalogDocument, CompletenessMode};
    use scenario_engine::{ScenarioCalculator, ScenarioCatalog};

    use crate::prompt::PromptContext;
    use crate::{InsightPipeline, PipelineConfig};

    pub const GOOD_RESPONSE: &str = "Here is the requested analysis.

## Impact Summary
In this stress scenario the portfolio is estimated to fall by roughly twenty-one percent. Most of the loss comes \
from the equity sleeve, which makes up the large majority of holdings, while the bond allocation cushions part of \
the decline. The confidence score reflects how closely past episodes resemble this portfolio.

## Key Risks
- Domestic equities carry the largest share of the portfolio and could decline about a quarter in value, which drives most of the estimated drawdown.
- International equities could decline even further than domestic shares, and currency swings can add to the volatility during a crisis.
- Correlations between asset classes tend to rise in stressed markets, so diversification may help less than usual.

## Opportunities
- Government bonds could gain in value as investors look for safety and interest rates are cut.
- Periods of market stress have historically created chances to rebalance at lower prices for investors with a long horizon.

## Risk Management
- Review whether the size of the estimated drawdown fits your time horizon and your need for liquidity.
- Set rebalancing bands in advance so that changes are made by rule rather than under pressure.
- Keep an emergency reserve separate from invested assets.

## Historical Context
Comparable episodes include the 2008 global financial crisis, when broad equity markets fell by around half from \
peak to trough before recovering over several years. Bonds issued by governments generally held their value during \
that period.
";

    pub const SHORT_RESPONSE: &str = "## Impact Summary
Losses are likely.
## Key Risks
- Stocks fall.
## Opportunities
- Bonds rise.
## Risk Management
- Diversify.
## Historical Context
See 2008.
";

    /// Provider that replays scripted responses, then repeats `then` (or fails when `None`).
    pub struct MockProvider {
        script: Mutex<VecDeque<Option<String>>>,
        then: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl MockProvider {
        pub fn new(script: Vec<Option<&str>>, then: Option<&str>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(|s| s.map(String::from)).collect()),
                then: then.map(String::from),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn always(text: &str) -> Self {
            Self::new(Vec::new(), Some(text))
        }

        pub fn failing() -> Self {
            Self::new(Vec::new(), None)
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceProvider for MockProvider {
        async fn invoke(
            &self,
            prompt: &str,
            _max_tokens: u32,
            _temperature: f64,
            _timeout: Duration,
        ) -> InferenceResult<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let next = self.script.lock().unwrap().pop_front();
            let text = match next {
                Some(scripted) => scripted,
                None => self.then.clone(),
            };
            match text {
                Some(text) => Ok(Completion {
                    text,
                    usage: Some(TokenUsage {
                        prompt_tokens: 400,
                        completion_tokens: 300,
                        total_tokens: 700,
                    }),
                }),
                None => Err(InferenceError::ServiceUnavailable("mock outage".to_string())),
            }
        }

        fn backend_name(&self) -> &'static str {
            "mock"
        }
    }

    /// In-memory portfolio and result store.
    #[derive(Default)]
    pub struct TestStore {
        pub portfolios: Mutex<HashMap<String, PortfolioSnapshot>>,
        pub saved: AtomicUsize,
        pub fail_writes: bool,
    }

    #[async_trait]
    impl PortfolioStore for TestStore {
        async fn get_portfolio(&self, id: &str) -> CoreResult<PortfolioSnapshot> {
            self.portfolios
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ScenarioError::PortfolioNotFound(id.to_string()))
        }
    }

    #[async_trait]
    impl ResultStore for TestStore {
        async fn save_result(&self, _result: &ScenarioResult) -> CoreResult<()> {
            if self.fail_writes {
                return Err(ScenarioError::Store("disk full".to_string()));
            }
            self.saved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn save_insight(&self, _portfolio_id: &str, _insight: &AiInsight) -> CoreResult<()> {
            if self.fail_writes {
                return Err(ScenarioError::Store("disk full".to_string()));
            }
            self.saved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scenario(id: &str, description: &str) -> ScenarioDefinition {
        ScenarioDefinition {
            id: id.to_string(),
            name: "Credit crunch".to_string(),
            description: description.to_string(),
            severity: 8,
            duration_months: 18,
            economic_parameters: BTreeMap::from([("gdp_growth".to_string(), -3.5)]),
            impact_factors: BTreeMap::from([
                (AssetCategory::DomesticEquity, ImpactFactor::new(-40.0, -10.0, -25.0, 1.0, 0.0)),
                (AssetCategory::InternationalEquity, ImpactFactor::new(-45.0, -15.0, -30.0, 1.0, 0.0)),
                (AssetCategory::GovernmentBonds, ImpactFactor::new(0.0, 20.0, 10.0, 1.0, 0.0)),
            ]),
            historical_precedents: vec!["the 2008 global financial crisis".to_string()],
            reference_allocation: default_reference_allocation(),
            model_validation_score: 70.0,
        }
    }

    pub fn catalog() -> Arc<ScenarioCatalog> {
        let catalog = ScenarioCatalog::load(
            CatalogDocument {
                version: "test-1".to_string(),
                parameters: CalculationParameters::default(),
                scenarios: vec![
                    scenario("crunch", "Credit markets seize up and equities sell off."),
                    scenario("bad-copy", "Commentators claimed a rebound was guaranteed to follow."),
                ],
            },
            CompletenessMode::Lenient,
        )
        .unwrap();
        Arc::new(catalog)
    }

    pub fn portfolio(id: &str, total: f64, parts: &[(&str, AssetCategory, f64)]) -> PortfolioSnapshot {
        PortfolioSnapshot {
            id: id.to_string(),
            total_value: total,
            currency: "USD".to_string(),
            holdings: parts
                .iter()
                .map(|(symbol, category, pct)| AssetHolding {
                    symbol: symbol.to_string(),
                    asset_category: *category,
                    allocation_percentage: *pct,
                    dollar_amount: total * pct / 100.0,
                    sector: String::new(),
                    geographic_region: String::new(),
                    risk_rating: category.baseline_risk(),
                })
                .collect(),
        }
    }

    /// 60% domestic, 25% international, 15% government bonds.
    pub fn balanced() -> PortfolioSnapshot {
        portfolio(
            "balanced",
            100_000.0,
            &[
                ("VTI", AssetCategory::DomesticEquity, 60.0),
                ("VXUS", AssetCategory::InternationalEquity, 25.0),
                ("BND", AssetCategory::GovernmentBonds, 15.0),
            ],
        )
    }

    pub fn context(profile: UserProfile) -> PromptContext {
        let catalog = catalog();
        let calculator = ScenarioCalculator::new(Arc::clone(&catalog));
        let portfolio = balanced();
        let result = calculator.calculate(&portfolio, "crunch").unwrap();
        let scenario = catalog.get_scenario("crunch").unwrap();
        PromptContext::new(
            &portfolio,
            scenario,
            &result,
            profile,
            catalog.parameters().concentration_threshold,
        )
    }

    pub fn pipeline_with(
        provider: Arc<MockProvider>,
        store: Arc<TestStore>,
        config: PipelineConfig,
    ) -> InsightPipeline {
        store
            .portfolios
            .lock()
            .unwrap()
            .insert("balanced".to_string(), balanced());
        InsightPipeline::new(
            config,
            ScenarioCalculator::new(catalog()),
            provider,
            Arc::clone(&store) as Arc<dyn PortfolioStore>,
            store,
        )
    }

    pub fn pipeline(provider: Arc<MockProvider>) -> InsightPipeline {
        pipeline_with(provider, Arc::new(TestStore::default()), PipelineConfig::default())
    }
}

#[cfg(test)]
mod pipeline_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use scenario_core::*;

    use super::fixtures::*;
    use crate::parser;
    use crate::validation::{ValidationPolicy, Validator};
    use crate::{PipelineConfig, PipelineError};

    #[test]
    fn test_good_response_fixture_is_acceptable() {
        let sections = parser::parse(GOOD_RESPONSE).unwrap();
        let outcome = Validator::new(ValidationPolicy::ai(800, 2500)).validate(&sections);
        assert!(outcome.accepted, "{:?}", outcome.issues);
        assert_eq!(outcome.quality_score, 94.0);
    }

    #[tokio::test]
    async fn test_failing_provider_still_completes() {
        let provider = Arc::new(MockProvider::failing());
        let pipeline = pipeline(Arc::clone(&provider));

        let analysis = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(analysis.insight.source_mode, SourceMode::TemplateFallback);
        assert_eq!(analysis.insight.fallback_reason, Some(FallbackReason::ProviderError));
        assert!(analysis.insight.disclaimer.is_some());
        assert_eq!(provider.calls(), 1);
        assert!((analysis.result.total_impact_percentage + 21.0).abs() < 1e-9);

        let ttl = analysis.insight.expires_at - analysis.insight.generated_at;
        assert_eq!(ttl.num_seconds(), 3_600);
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let provider = Arc::new(MockProvider::always(GOOD_RESPONSE));
        let pipeline = pipeline(Arc::clone(&provider));

        let first = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();
        let second = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(first.insight.source_mode, SourceMode::AiGenerated);
        assert_eq!(
            serde_json::to_string(&first.insight).unwrap(),
            serde_json::to_string(&second.insight).unwrap()
        );
        assert_eq!(provider.calls(), 1);

        let ttl = first.insight.expires_at - first.insight.generated_at;
        assert_eq!(ttl.num_seconds(), 86_400);

        let metrics = pipeline.metrics_snapshot();
        assert_eq!(metrics.insight_cache_hits, 1);
        assert_eq!(metrics.insight_cache_misses, 1);
        assert_eq!(metrics.ai_accepted, 1);
        assert!(metrics.monthly_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_rejected_response_is_retried() {
        let provider = Arc::new(MockProvider::new(vec![Some(SHORT_RESPONSE)], Some(GOOD_RESPONSE)));
        let pipeline = pipeline(Arc::clone(&provider));

        let analysis = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(analysis.insight.source_mode, SourceMode::AiGenerated);
        assert_eq!(provider.calls(), 2);
        let prompts = provider.prompts();
        assert!(!prompts[0].contains("previous answer was rejected"));
        assert!(prompts[1].contains("previous answer was rejected"));
        assert!(prompts[1].contains("too short"));
        assert_eq!(pipeline.metrics_snapshot().validation_rejections, 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = Arc::new(MockProvider::always(SHORT_RESPONSE));
        let pipeline = pipeline(Arc::clone(&provider));

        let analysis = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();

        // first attempt plus two retries
        assert_eq!(provider.calls(), 3);
        assert_eq!(analysis.insight.source_mode, SourceMode::TemplateFallback);
        assert_eq!(analysis.insight.fallback_reason, Some(FallbackReason::ValidationExhausted));
    }

    #[tokio::test]
    async fn test_unparseable_response_counts_as_rejection() {
        let provider = Arc::new(MockProvider::always("The market will recover, trust me."));
        let pipeline = pipeline(Arc::clone(&provider));

        let analysis = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();
        assert_eq!(analysis.insight.fallback_reason, Some(FallbackReason::ValidationExhausted));
        assert_eq!(pipeline.metrics_snapshot().validation_rejections, 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_inference() {
        let provider = Arc::new(MockProvider::always(GOOD_RESPONSE));
        let config = PipelineConfig {
            monthly_budget_usd: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with(Arc::clone(&provider), Arc::new(TestStore::default()), config);

        let analysis = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert_eq!(analysis.insight.source_mode, SourceMode::TemplateFallback);
        assert_eq!(analysis.insight.fallback_reason, Some(FallbackReason::BudgetExceeded));
        assert_eq!(pipeline.metrics_snapshot().budget_denials, 1);
    }

    #[tokio::test]
    async fn test_template_failing_validation_degrades_to_minimal() {
        let provider = Arc::new(MockProvider::failing());
        let pipeline = pipeline(provider);

        let analysis = pipeline
            .analyze("balanced", "bad-copy", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(analysis.insight.source_mode, SourceMode::MinimalFallback);
        assert!(analysis
            .insight
            .disclaimer
            .as_deref()
            .unwrap()
            .starts_with("Insight unavailable"));
        assert!(!analysis.insight.sections.summary.is_empty());
    }

    #[tokio::test]
    async fn test_similar_cached_insight_is_reused() {
        // one good answer, then the provider goes down
        let provider = Arc::new(MockProvider::new(vec![Some(GOOD_RESPONSE)], None));
        let pipeline = pipeline(Arc::clone(&provider));

        let original = pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();
        assert_eq!(original.insight.source_mode, SourceMode::AiGenerated);

        let shifted = portfolio(
            "shifted",
            100_000.0,
            &[
                ("SPY", AssetCategory::DomesticEquity, 61.0),
                ("EFA", AssetCategory::InternationalEquity, 24.0),
                ("GOVT", AssetCategory::GovernmentBonds, 15.0),
            ],
        );
        let similar = pipeline
            .analyze_snapshot(&shifted, "crunch", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(similar.insight.source_mode, SourceMode::CachedSimilar);
        assert_eq!(similar.insight.fallback_reason, Some(FallbackReason::ProviderError));
        assert_eq!(similar.insight.sections, original.insight.sections);
        assert_ne!(similar.insight.fingerprint, original.insight.fingerprint);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_requests_share_one_call() {
        let provider = Arc::new(MockProvider::always(GOOD_RESPONSE).with_delay(Duration::from_millis(100)));
        let pipeline = pipeline(Arc::clone(&provider));
        let portfolio = balanced();

        let requests = (0..20).map(|_| {
            let pipeline = pipeline.clone();
            let portfolio = portfolio.clone();
            tokio::spawn(async move {
                pipeline
                    .analyze_snapshot(&portfolio, "crunch", UserProfile::default())
                    .await
            })
        });
        let results = futures::future::join_all(requests).await;

        assert_eq!(provider.calls(), 1);
        let insights: Vec<AiInsight> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().insight)
            .collect();
        assert!(insights.iter().all(|i| i == &insights[0]));
    }

    #[tokio::test]
    async fn test_saturated_pool_is_retryable() {
        let provider = Arc::new(MockProvider::always(GOOD_RESPONSE).with_delay(Duration::from_millis(200)));
        let config = PipelineConfig {
            max_concurrent_inferences: 1,
            max_queued_inferences: 0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with(Arc::clone(&provider), Arc::new(TestStore::default()), config);

        let running = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.analyze("balanced", "crunch", UserProfile::default()).await })
        };
        while provider.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // a different tier is a different fingerprint and needs its own inference slot
        let advanced = UserProfile {
            experience_level: ExperienceLevel::Advanced,
            ..UserProfile::default()
        };
        let err = pipeline.analyze("balanced", "crunch", advanced).await.unwrap_err();
        assert!(matches!(err, PipelineError::Saturated { .. }));
        assert!(err.is_retryable());

        assert!(running.await.unwrap().is_ok());
        assert_eq!(pipeline.metrics_snapshot().pool_rejections, 1);
    }

    #[tokio::test]
    async fn test_input_errors_surface() {
        let pipeline = pipeline(Arc::new(MockProvider::always(GOOD_RESPONSE)));

        let mut invalid = balanced();
        invalid.holdings[0].allocation_percentage = 50.0;
        let err = pipeline
            .analyze_snapshot(&invalid, "unknown", UserProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Input(ScenarioError::InvalidPortfolio(_))));

        let err = pipeline
            .analyze("balanced", "unknown", UserProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Input(ScenarioError::UnknownScenario(_))));

        let err = pipeline
            .analyze("nobody", "crunch", UserProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Input(ScenarioError::PortfolioNotFound(_))));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalidate_portfolio_drops_results_only() {
        let pipeline = pipeline(Arc::new(MockProvider::always(GOOD_RESPONSE)));
        pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();

        assert_eq!(pipeline.invalidate_portfolio("balanced"), 1);
        assert_eq!(pipeline.invalidate_portfolio("balanced"), 0);

        let metrics = pipeline.metrics_snapshot();
        assert_eq!(metrics.result_cache.entries, 0);
        assert_eq!(metrics.insight_cache.entries, 1);
    }

    #[tokio::test]
    async fn test_store_failures_are_not_surfaced() {
        let store = Arc::new(TestStore {
            fail_writes: true,
            ..TestStore::default()
        });
        let pipeline = pipeline_with(
            Arc::new(MockProvider::always(GOOD_RESPONSE)),
            store,
            PipelineConfig::default(),
        );

        assert!(pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .is_ok());
        assert_eq!(pipeline.metrics_snapshot().result_store_failures, 2);
    }

    #[tokio::test]
    async fn test_results_are_written_through() {
        let store = Arc::new(TestStore::default());
        let pipeline = pipeline_with(
            Arc::new(MockProvider::always(GOOD_RESPONSE)),
            Arc::clone(&store),
            PipelineConfig::default(),
        );
        pipeline
            .analyze("balanced", "crunch", UserProfile::default())
            .await
            .unwrap();
        assert_eq!(store.saved.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
