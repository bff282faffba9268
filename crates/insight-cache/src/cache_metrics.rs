use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric namespace for every series emitted by this crate
pub const METRIC_NAMESPACE: &str = "insight_cache";

/// Cache events forwarded to whatever `metrics` recorder is installed.
#[derive(Debug, Clone, Copy)]
pub enum CacheEvent {
    Hit,
    Miss,
    Coalesced,
    ComputeFailed,
    Eviction,
    Invalidation { count: u64 },
}

pub struct CacheMetrics;

impl CacheMetrics {
    pub fn record(namespace: &'static str, event: CacheEvent) {
        match event {
            CacheEvent::Hit => {
                counter!(format!("{}.hit", METRIC_NAMESPACE), "cache" => namespace).increment(1);
            }
            CacheEvent::Miss => {
                counter!(format!("{}.miss", METRIC_NAMESPACE), "cache" => namespace).increment(1);
            }
            CacheEvent::Coalesced => {
                counter!(format!("{}.coalesced", METRIC_NAMESPACE), "cache" => namespace).increment(1);
            }
            CacheEvent::ComputeFailed => {
                counter!(format!("{}.compute_error", METRIC_NAMESPACE), "cache" => namespace).increment(1);
            }
            CacheEvent::Eviction => {
                counter!(format!("{}.eviction", METRIC_NAMESPACE), "cache" => namespace).increment(1);
            }
            CacheEvent::Invalidation { count } => {
                counter!(format!("{}.invalidated_entries", METRIC_NAMESPACE), "cache" => namespace)
                    .increment(count);
            }
        }
    }

    pub fn record_compute_latency(namespace: &'static str, duration: Duration) {
        histogram!(format!("{}.compute_latency_ms", METRIC_NAMESPACE), "cache" => namespace)
            .record(duration.as_secs_f64() * 1000.0);
    }

    pub fn record_size(namespace: &'static str, entries: usize) {
        gauge!(format!("{}.entries", METRIC_NAMESPACE), "cache" => namespace).set(entries as f64);
    }
}
