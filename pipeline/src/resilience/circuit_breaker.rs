use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    outcomes: VecDeque<bool>,
    window: usize,
    min_calls: usize,
    failure_rate: f64,
    open_wait: Duration,
    half_open_probes: usize,
    state: CircuitState,
    opened_at: Option<Instant>,
    half_open_probes_remaining: usize,
}

/// Trips after `failure_rate` failures over a sliding `window` of calls
/// (minimum `min_calls` observed), opens for `open_wait`, then allows
/// `half_open_probes` probe calls through before deciding to close or
/// reopen.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        window: usize,
        min_calls: usize,
        failure_rate: f64,
        open_wait: Duration,
        half_open_probes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner {
                outcomes: VecDeque::with_capacity(window),
                window,
                min_calls,
                failure_rate,
                open_wait,
                half_open_probes,
                state: CircuitState::Closed,
                opened_at: None,
                half_open_probes_remaining: 0,
            })),
        }
    }

    /// Whether the caller should attempt the real call (`true`) or use
    /// the fallback (`false`) without issuing an outbound request.
    pub async fn allow(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= inner.open_wait {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probes_remaining = inner.half_open_probes;
                    warn!(circuit = %self.name, "half-opening after cooldown");
                    inner.half_open_probes_remaining = inner.half_open_probes_remaining.saturating_sub(1);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes_remaining > 0 {
                    inner.half_open_probes_remaining -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record(&self, success: bool) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                if success {
                    inner.state = CircuitState::Closed;
                    inner.outcomes.clear();
                } else {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.outcomes.clear();
                }
            }
            _ => {
                if inner.outcomes.len() == inner.window {
                    inner.outcomes.pop_front();
                }
                inner.outcomes.push_back(success);
                if inner.outcomes.len() >= inner.min_calls {
                    let failures = inner.outcomes.iter().filter(|ok| !**ok).count();
                    let rate = failures as f64 / inner.outcomes.len() as f64;
                    if rate >= inner.failure_rate {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        warn!(circuit = %self.name, rate, "circuit tripped open");
                    }
                }
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trips_open_after_failure_rate_exceeded() {
        let cb = CircuitBreaker::new("places", 100, 10, 0.5, Duration::from_secs(30), 10);
        for _ in 0..10 {
            assert!(cb.allow().await);
            cb.record(false).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow().await, "open circuit must reject without calling");
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_and_closes_on_success() {
        let cb = CircuitBreaker::new("places", 100, 2, 0.5, Duration::from_millis(20), 1);
        cb.record(false).await;
        cb.record(false).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cb.allow().await);
        cb.record(true).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn stays_closed_below_min_calls() {
        let cb = CircuitBreaker::new("places", 100, 10, 0.5, Duration::from_secs(30), 10);
        for _ in 0..5 {
            cb.record(false).await;
        }
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
