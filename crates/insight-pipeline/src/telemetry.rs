use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use insight_cache::CacheStats;
use metrics::{counter, gauge, histogram};
use scenario_core::{FallbackReason, SourceMode};
use serde::Serialize;

pub const METRIC_NAMESPACE: &str = "insight_pipeline";

/// Upper bounds (ms) of the inference latency buckets; the last bucket is unbounded.
pub const LATENCY_BUCKETS_MS: [u64; 8] = [100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

const REASONS: [FallbackReason; 3] = [
    FallbackReason::ValidationExhausted,
    FallbackReason::ProviderError,
    FallbackReason::BudgetExceeded,
];

const MODES: [SourceMode; 4] = [
    SourceMode::AiGenerated,
    SourceMode::CachedSimilar,
    SourceMode::TemplateFallback,
    SourceMode::MinimalFallback,
];

fn reason_index(reason: FallbackReason) -> usize {
    match reason {
        FallbackReason::ValidationExhausted => 0,
        FallbackReason::ProviderError => 1,
        FallbackReason::BudgetExceeded => 2,
    }
}

fn mode_index(mode: SourceMode) -> usize {
    match mode {
        SourceMode::AiGenerated => 0,
        SourceMode::CachedSimilar => 1,
        SourceMode::TemplateFallback => 2,
        SourceMode::MinimalFallback => 3,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyBucket {
    /// `None` for the overflow bucket
    pub le_ms: Option<u64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackCount {
    pub reason: FallbackReason,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceModeCount {
    pub source_mode: SourceMode,
    pub count: u64,
}

/// Serialisable view of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub insight_cache_hits: u64,
    pub insight_cache_misses: u64,
    pub insight_cache_hit_rate: f64,
    pub inference_calls: u64,
    pub inference_failures: u64,
    pub validation_rejections: u64,
    pub validation_rejection_rate: f64,
    pub ai_accepted: u64,
    pub fallbacks: Vec<FallbackCount>,
    pub insights_by_source: Vec<SourceModeCount>,
    pub budget_denials: u64,
    pub pool_rejections: u64,
    pub result_store_failures: u64,
    pub inference_latency_ms: Vec<LatencyBucket>,
    pub inference_latency_sum_ms: u64,
    pub monthly_cost_usd: f64,
    pub monthly_budget_usd: f64,
    pub insight_cache: CacheStats,
    pub result_cache: CacheStats,
}

/// Pipeline counters, kept locally for `/api/metrics` and mirrored to the
/// `metrics` facade for whichever recorder is installed.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    inference_calls: AtomicU64,
    inference_failures: AtomicU64,
    validation_rejections: AtomicU64,
    ai_accepted: AtomicU64,
    fallbacks: [AtomicU64; 3],
    by_source: [AtomicU64; 4],
    budget_denials: AtomicU64,
    pool_rejections: AtomicU64,
    store_failures: AtomicU64,
    latency_buckets: [AtomicU64; 9],
    latency_sum_ms: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        bump(&self.requests);
        counter!(format!("{}.requests", METRIC_NAMESPACE)).increment(1);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            bump(&self.cache_hits);
            counter!(format!("{}.cache_hit", METRIC_NAMESPACE)).increment(1);
        } else {
            bump(&self.cache_misses);
            counter!(format!("{}.cache_miss", METRIC_NAMESPACE)).increment(1);
        }
    }

    pub fn record_inference(&self, latency: Duration, success: bool) {
        bump(&self.inference_calls);
        let ms = latency.as_millis().min(u64::MAX as u128) as u64;
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|&le| ms <= le)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        bump(&self.latency_buckets[bucket]);
        self.latency_sum_ms.fetch_add(ms, Ordering::Relaxed);
        histogram!(format!("{}.inference_latency_ms", METRIC_NAMESPACE)).record(latency.as_secs_f64() * 1000.0);

        if !success {
            bump(&self.inference_failures);
            counter!(format!("{}.inference_failure", METRIC_NAMESPACE)).increment(1);
        }
    }

    pub fn record_validation(&self, accepted: bool) {
        if accepted {
            bump(&self.ai_accepted);
            counter!(format!("{}.validation_accept", METRIC_NAMESPACE)).increment(1);
        } else {
            bump(&self.validation_rejections);
            counter!(format!("{}.validation_reject", METRIC_NAMESPACE)).increment(1);
        }
    }

    pub fn record_fallback(&self, reason: FallbackReason, served: SourceMode) {
        bump(&self.fallbacks[reason_index(reason)]);
        counter!(
            format!("{}.fallback", METRIC_NAMESPACE),
            "reason" => reason.as_str(),
            "source_mode" => served.as_str()
        )
        .increment(1);
    }

    /// Source mode of every insight produced by a flight (cache hits excluded).
    pub fn record_insight(&self, mode: SourceMode) {
        bump(&self.by_source[mode_index(mode)]);
        counter!(format!("{}.insight", METRIC_NAMESPACE), "source_mode" => mode.as_str()).increment(1);
    }

    pub fn record_budget_denied(&self) {
        bump(&self.budget_denials);
        counter!(format!("{}.budget_denied", METRIC_NAMESPACE)).increment(1);
    }

    pub fn record_pool_rejected(&self) {
        bump(&self.pool_rejections);
        counter!(format!("{}.pool_rejected", METRIC_NAMESPACE)).increment(1);
    }

    pub fn record_store_failure(&self) {
        bump(&self.store_failures);
        counter!(format!("{}.result_store_failure", METRIC_NAMESPACE)).increment(1);
    }

    pub fn record_monthly_cost(&self, spent_usd: f64) {
        gauge!(format!("{}.monthly_cost_usd", METRIC_NAMESPACE)).set(spent_usd);
    }

    pub fn inference_calls(&self) -> u64 {
        load(&self.inference_calls)
    }

    pub fn snapshot(
        &self,
        monthly_cost_usd: f64,
        monthly_budget_usd: f64,
        insight_cache: CacheStats,
        result_cache: CacheStats,
    ) -> MetricsSnapshot {
        let hits = load(&self.cache_hits);
        let misses = load(&self.cache_misses);
        let rejections = load(&self.validation_rejections);
        let accepted = load(&self.ai_accepted);

        let mut inference_latency_ms: Vec<LatencyBucket> = LATENCY_BUCKETS_MS
            .iter()
            .zip(&self.latency_buckets)
            .map(|(&le, count)| LatencyBucket {
                le_ms: Some(le),
                count: load(count),
            })
            .collect();
        inference_latency_ms.push(LatencyBucket {
            le_ms: None,
            count: load(&self.latency_buckets[LATENCY_BUCKETS_MS.len()]),
        });

        MetricsSnapshot {
            requests: load(&self.requests),
            insight_cache_hits: hits,
            insight_cache_misses: misses,
            insight_cache_hit_rate: ratio(hits, hits + misses),
            inference_calls: load(&self.inference_calls),
            inference_failures: load(&self.inference_failures),
            validation_rejections: rejections,
            validation_rejection_rate: ratio(rejections, rejections + accepted),
            ai_accepted: accepted,
            fallbacks: REASONS
                .iter()
                .map(|&reason| FallbackCount {
                    reason,
                    count: load(&self.fallbacks[reason_index(reason)]),
                })
                .collect(),
            insights_by_source: MODES
                .iter()
                .map(|&source_mode| SourceModeCount {
                    source_mode,
                    count: load(&self.by_source[mode_index(source_mode)]),
                })
                .collect(),
            budget_denials: load(&self.budget_denials),
            pool_rejections: load(&self.pool_rejections),
            result_store_failures: load(&self.store_failures),
            inference_latency_ms,
            inference_latency_sum_ms: load(&self.latency_sum_ms),
            monthly_cost_usd,
            monthly_budget_usd,
            insight_cache,
            result_cache,
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
