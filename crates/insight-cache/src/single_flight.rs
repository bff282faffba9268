use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cache_metrics::{CacheEvent, CacheMetrics};
use crate::error::CacheError;
use crate::stats::{CacheStats, StatsCounters};

type Outcome<V, E> = Result<Arc<V>, CacheError<E>>;
type FlightSender<V, E> = watch::Sender<Option<Outcome<V, E>>>;
type FlightReceiver<V, E> = watch::Receiver<Option<Outcome<V, E>>>;

/// Upper bound used when `now + ttl` would overflow the clock.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Internal cache entry with expiry
struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

struct Inner<V, E> {
    namespace: &'static str,
    max_entries: usize,
    entries: DashMap<String, CacheEntry<V>>,
    in_flight: DashMap<String, FlightReceiver<V, E>>,
    /// Bumped on every invalidation. A flight that started under an older epoch
    /// still answers its waiters but does not store its value.
    epoch: AtomicU64,
    stats: StatsCounters,
}

/// TTL cache with single-flight computation per key.
///
/// Values are shared as `Arc<V>`. Errors are fanned out to the waiters of the flight
/// that produced them and never stored, so the next caller retries.
///
/// Computations run on a spawned task: a caller that stops waiting (timeout, client
/// disconnect) does not cancel the shared work, which still completes and is stored
/// for later callers.
pub struct SingleFlightCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for SingleFlightCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Removes the in-flight marker when the computation task finishes or unwinds.
struct FlightGuard<V, E> {
    inner: Arc<Inner<V, E>>,
    key: String,
}

impl<V, E> Drop for FlightGuard<V, E> {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.key);
    }
}

impl<V, E> SingleFlightCache<V, E>
where
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(namespace: &'static str, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace,
                max_entries: max_entries.max(1),
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                epoch: AtomicU64::new(0),
                stats: StatsCounters::default(),
            }),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.inner.namespace
    }

    /// Return the cached value for `key`, or run `compute` once and share its outcome
    /// with every concurrent caller of the same key. Successful values live for `ttl`.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Outcome<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_or_compute_with(key, move || async move { compute().await.map(|value| (value, ttl)) })
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but the computation chooses the
    /// TTL of its own result.
    pub async fn get_or_compute_with<F, Fut>(&self, key: &str, compute: F) -> Outcome<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(V, Duration), E>> + Send + 'static,
    {
        if let Some(value) = self.lookup(key) {
            self.record(CacheEvent::Hit, &self.inner.stats.hits);
            return Ok(value);
        }

        let rx = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(flight) => {
                self.record(CacheEvent::Coalesced, &self.inner.stats.coalesced);
                tracing::debug!("[{}] attaching to in-flight computation for {}", self.inner.namespace, key);
                flight.get().clone()
            }
            Entry::Vacant(slot) => {
                // A flight may have stored its value between the lookup above and this lock
                if let Some(value) = self.lookup(key) {
                    self.record(CacheEvent::Hit, &self.inner.stats.hits);
                    return Ok(value);
                }
                self.record(CacheEvent::Miss, &self.inner.stats.misses);

                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                self.spawn_flight(key.to_string(), tx, compute);
                rx
            }
        };

        Self::wait(key, rx).await
    }

    fn spawn_flight<F, Fut>(&self, key: String, tx: FlightSender<V, E>, compute: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(V, Duration), E>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let epoch = inner.epoch.load(Ordering::Acquire);

        tokio::spawn(async move {
            let guard = FlightGuard {
                inner: Arc::clone(&inner),
                key: key.clone(),
            };
            StatsCounters::bump(&inner.stats.computations, 1);
            let started = std::time::Instant::now();

            let outcome = match compute().await {
                Ok((value, ttl)) => {
                    let value = Arc::new(value);
                    if inner.epoch.load(Ordering::Acquire) == epoch {
                        inner.store(&key, Arc::clone(&value), ttl);
                    } else {
                        tracing::debug!(
                            "[{}] {} was invalidated while computing; result not stored",
                            inner.namespace,
                            key
                        );
                    }
                    Ok(value)
                }
                Err(e) => {
                    StatsCounters::bump(&inner.stats.failures, 1);
                    CacheMetrics::record(inner.namespace, CacheEvent::ComputeFailed);
                    Err(CacheError::Compute(e))
                }
            };
            CacheMetrics::record_compute_latency(inner.namespace, started.elapsed());

            // Store first, then clear the marker, then notify: a caller that misses the
            // marker is guaranteed to find the stored value.
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
    }

    async fn wait(key: &str, mut rx: FlightReceiver<V, E>) -> Outcome<V, E> {
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                let last = rx.borrow().clone();
                return last.unwrap_or_else(|| {
                    Err(CacheError::Aborted {
                        key: key.to_string(),
                    })
                });
            }
        }
    }

    /// Store a value directly, replacing any existing entry.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.store(key, Arc::clone(&value), ttl);
        value
    }

    /// Non-blocking read that does not touch hit/miss statistics and never waits on
    /// an in-flight computation.
    pub fn peek(&self, key: &str) -> Option<Arc<V>> {
        self.lookup(key)
    }

    /// Remove one entry. Returns whether anything was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.inner.entries.remove(key).is_some();
        if removed {
            StatsCounters::bump(&self.inner.stats.invalidations, 1);
            CacheMetrics::record(self.inner.namespace, CacheEvent::Invalidation { count: 1 });
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`. Returns the number removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let before = self.inner.entries.len();
        self.inner.entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before.saturating_sub(self.inner.entries.len());
        if removed > 0 {
            StatsCounters::bump(&self.inner.stats.invalidations, removed as u64);
            CacheMetrics::record(
                self.inner.namespace,
                CacheEvent::Invalidation { count: removed as u64 },
            );
        }
        removed
    }

    /// Drop expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner
            .stats
            .snapshot(self.inner.entries.len(), self.inner.in_flight.len())
    }

    fn lookup(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        {
            let entry = self.inner.entries.get(key)?;
            if entry.expires_at > now {
                return Some(Arc::clone(&entry.value));
            }
        }
        self.inner.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    fn record(&self, event: CacheEvent, counter: &AtomicU64) {
        StatsCounters::bump(counter, 1);
        CacheMetrics::record(self.inner.namespace, event);
    }
}

impl<V, E> Inner<V, E> {
    fn store(&self, key: &str, value: Arc<V>, ttl: Duration) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.make_room();
        }
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .unwrap_or_else(|| now + Duration::from_secs(3600));
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        CacheMetrics::record_size(self.namespace, self.entries.len());
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Evict expired entries, then the entry closest to expiry if still full.
    fn make_room(&self) {
        let mut evicted = self.purge_expired() as u64;
        if self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|e| e.value().expires_at)
                .map(|e| e.key().clone());
            if let Some(victim) = victim {
                if self.entries.remove(&victim).is_some() {
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            StatsCounters::bump(&self.stats.evictions, evicted);
            for _ in 0..evicted {
                CacheMetrics::record(self.namespace, CacheEvent::Eviction);
            }
            tracing::debug!("[{}] evicted {} entries", self.namespace, evicted);
        }
    }
}
