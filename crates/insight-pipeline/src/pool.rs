use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{PipelineError, PipelineResult};

/// Seconds a rejected caller is told to wait before retrying.
const RETRY_AFTER_SECS: u64 = 5;

/// Bounded worker pool for inference flights.
///
/// At most `max_concurrent` flights hold a permit; up to `max_queued` more may wait for
/// one. Anything beyond that is turned away with a retryable `Saturated` error.
#[derive(Clone)]
pub struct InferencePool {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_concurrent: usize,
    max_queued: usize,
}

struct WaitGuard(Arc<AtomicUsize>);

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl InferencePool {
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_concurrent,
            max_queued,
        }
    }

    pub async fn acquire(&self) -> PipelineResult<OwnedSemaphorePermit> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(permit);
        }

        let queued = self
            .waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_queued).then_some(n + 1)
            });
        if let Err(queued) = queued {
            tracing::warn!(
                "Inference pool saturated: {} running, {} queued",
                self.in_flight(),
                queued
            );
            return Err(PipelineError::Saturated {
                in_flight: self.in_flight(),
                queued,
                retry_after_secs: RETRY_AFTER_SECS,
            });
        }

        let _guard = WaitGuard(Arc::clone(&self.waiting));
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Aborted("inference pool closed".to_string()))
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_then_queue_then_reject() {
        let pool = InferencePool::new(1, 1);
        let first = pool.acquire().await.unwrap();
        assert_eq!(pool.in_flight(), 1);

        let queued_pool = pool.clone();
        let waiter = tokio::spawn(async move { queued_pool.acquire().await.map(|_| ()) });
        while pool.queued() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PipelineError::Saturated { in_flight: 1, queued: 1, .. }));
        assert!(err.is_retryable());

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_zero_queue_rejects_immediately() {
        let pool = InferencePool::new(1, 0);
        let _held = pool.acquire().await.unwrap();
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_leaves_queue() {
        let pool = InferencePool::new(1, 1);
        let _held = pool.acquire().await.unwrap();
        let result = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(result.is_err());
        assert_eq!(pool.queued(), 0);
    }
}
