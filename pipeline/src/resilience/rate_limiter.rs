use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Enforces a minimum interval between outbound requests across the
/// process. A flat interval rather than a token bucket, following the
/// same "guard last-request-time under a mutex, sleep the difference"
/// shape as the teacher's `pipeline/ingestion/rate_limiter.rs`.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Instant::now() - min_interval)),
            min_interval,
        }
    }

    /// Block the caller until at least `min_interval` has elapsed since
    /// the last acquire anywhere in the process.
    pub async fn acquire(&self) {
        let mut last = self.inner.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(*last);
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_enforces_minimum_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
