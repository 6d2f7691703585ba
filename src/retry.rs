use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Observer invoked synchronously before each backoff wait (never before the
/// first attempt). The registry implements this to count retries per URL.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, url: &str, attempt: u32, cause: &Error);
}

/// No-op observer for callers that do not track retries.
pub struct NullObserver;

impl RetryObserver for NullObserver {
    fn on_retry(&self, _url: &str, _attempt: u32, _cause: &Error) {}
}

/// Bounded retry with jittered exponential backoff. Only transient errors are
/// retried; the last error is surfaced unmodified.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay before attempt `attempt + 1`, with uniform jitter to
    /// desynchronize concurrent retriers.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_backoff);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        exp.mul_f64(jitter).min(self.max_backoff)
    }

    pub async fn run<F, Fut, T>(&self, url: &str, observer: &dyn RetryObserver, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    observer.on_retry(url, attempt, &err);
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "Retrying {} (attempt {}) in {:.2}s due to: {}",
                        url,
                        attempt,
                        delay.as_secs_f64(),
                        err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
