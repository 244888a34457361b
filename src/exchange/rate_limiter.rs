//! Token-bucket rate limiter for exchange requests
//!
//! Upbit throttles per second per endpoint group; one bucket in front of
//! every request keeps the loop under the quotation limit.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens granted per refill interval
    pub max_requests: usize,
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 8,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, requests_per_interval: usize) -> Self {
        self.max_requests = requests_per_interval.max(1);
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

/// Shared token bucket. Clones draw from the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    max_permits: usize,
    last_refill: Arc<Mutex<Instant>>,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_requests)),
            max_permits: config.max_requests,
            last_refill: Arc::new(Mutex::new(Instant::now())),
            refill_interval: config.refill_interval,
        }
    }

    pub fn with_rate(requests_per_second: usize) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(requests_per_second))
    }

    /// Wait until a token is available and consume it
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire().await {
                return;
            }
            let wait = {
                let last = self.last_refill.lock().await;
                self.refill_interval.saturating_sub(last.elapsed())
            };
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Consume a token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        self.try_refill().await;
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn try_refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        if last_refill.elapsed() < self.refill_interval {
            return;
        }
        let missing = self
            .max_permits
            .saturating_sub(self.permits.available_permits());
        if missing > 0 {
            self.permits.add_permits(missing);
        }
        *last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exhausted_bucket_rejects() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(2)
                .with_refill_interval(Duration::from_secs(60)),
        );

        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert_eq!(limiter.available_permits(), 0);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(1)
                .with_refill_interval(Duration::from_millis(30)),
        );

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_clone_shares_bucket() {
        let a = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(3)
                .with_refill_interval(Duration::from_secs(60)),
        );
        let b = a.clone();

        a.acquire().await;
        assert_eq!(b.available_permits(), 2);
    }
}
