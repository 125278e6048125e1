use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Lets callers tell `retry_with_backoff` which errors are worth a
/// retry; only transient errors are retry-eligible.
pub trait Classify {
    fn is_transient(&self) -> bool;
}

/// Retries `op` up to `max_attempts` times with exponential backoff
/// starting at `base_delay`, only for transient errors. A permanent
/// error returns immediately without consuming a retry.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    op_name: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let backoff = base_delay * 2u32.pow(attempt - 1);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..base_delay.as_millis() as u64 + 1));
                let delay = backoff + jitter;
                warn!(op = op_name, attempt, %err, "transient failure, retrying after {:?}", delay);
                crate::observability::metrics::venues::retry_attempt(op_name, attempt);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestErr(bool);
    impl std::fmt::Display for TestErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }
    impl Classify for TestErr {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = Cell::new(0);
        let result: Result<u32, TestErr> = retry_with_backoff(3, Duration::from_millis(1), "test", || {
            calls.set(calls.get() + 1);
            async move {
                if calls.get() < 3 {
                    Err(TestErr(true))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = Cell::new(0);
        let result: Result<u32, TestErr> = retry_with_backoff(3, Duration::from_millis(1), "test", || {
            calls.set(calls.get() + 1);
            async move { Err(TestErr(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<u32, TestErr> = retry_with_backoff(3, Duration::from_millis(1), "test", || {
            calls.set(calls.get() + 1);
            async move { Err(TestErr(true)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }
}
