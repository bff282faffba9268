//! Insight Cache
//!
//! In-process TTL store with single-flight `get_or_compute`: for any key, at most one
//! computation runs at a time and every caller that arrives while it is in flight
//! receives the same outcome.

pub mod cache_metrics;
pub mod error;
pub mod single_flight;
pub mod stats;

pub use error::CacheError;
pub use single_flight::SingleFlightCache;
pub use stats::CacheStats;
