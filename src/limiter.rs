use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Fixed-window rate limiter: at most `rate` acquisitions may start per
/// `window`. Contention is first-come-first-served; `acquire` only ever
/// delays the caller, it cannot fail.
#[derive(Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(rate: usize, window: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(rate)),
            window,
        }
    }

    /// Wait until an operation is allowed to start. The permit is returned to
    /// the pool once the window has elapsed, not when the caller finishes.
    pub async fn acquire(&self) {
        let permit = self
            .semaphore
            .clone()
            .acquire_many_owned(1)
            .await
            .expect("rate limiter semaphore never closes");

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn permits_within_window_do_not_block() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_acquire_waits_for_window() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            limiter.acquire().await;
        }

        let blocked = tokio::time::timeout(Duration::from_millis(500), limiter.acquire()).await;
        assert!(blocked.is_err(), "sixth acquire should block mid-window");

        // After the window elapses the earliest permit is released.
        let unblocked = tokio::time::timeout(Duration::from_secs(2), limiter.acquire()).await;
        assert!(unblocked.is_ok());
    }
}
