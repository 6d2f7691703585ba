use crate::error::Error;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::retry::RetryObserver;
use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Default)]
struct Counters {
    queue_depth: usize,
    success_count: u64,
    failure_count: u64,
    timeout_count: u64,
    persist_failures: u64,
    total_response_time: f64,
    retry_counts: HashMap<String, u64>,
}

/// Process-lifetime counter registry shared by every pipeline stage.
///
/// All counters live behind a single lock so `snapshot` sees a consistent
/// view; the lock is never held across an await. Each recording is also
/// emitted through the `metrics` facade so the Prometheus exporter can
/// render the same series.
pub struct MetricsRegistry {
    counters: Mutex<Counters>,
    started: AtomicBool,
    start_time: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Flip the status surface from "not ready" to live.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn record_success(&self, response_time: f64) {
        {
            let mut c = self.locked();
            c.success_count += 1;
            c.total_response_time += response_time;
        }
        counter!("fetch_success_total").increment(1);
        histogram!("fetch_response_seconds").record(response_time);
    }

    pub fn record_failure(&self) {
        self.locked().failure_count += 1;
        counter!("fetch_failure_total").increment(1);
    }

    pub fn record_timeout(&self) {
        self.locked().timeout_count += 1;
        counter!("fetch_timeout_total").increment(1);
    }

    pub fn record_retry(&self, url: &str) {
        {
            let mut c = self.locked();
            *c.retry_counts.entry(url.to_string()).or_insert(0) += 1;
        }
        counter!("fetch_retries_total", "url" => url.to_string()).increment(1);
    }

    pub fn record_persist_failure(&self) {
        self.locked().persist_failures += 1;
        counter!("persist_failure_total").increment(1);
    }

    /// Current buffer depth, reported by the queue on every put/take.
    pub fn set_queue_depth(&self, depth: usize) {
        self.locked().queue_depth = depth;
        gauge!("queue_current_size").set(depth as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.locked();
        let average_response_time = if c.success_count > 0 {
            c.total_response_time / c.success_count as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            queue_size: c.queue_depth,
            success_count: c.success_count,
            failure_count: c.failure_count,
            timeout_count: c.timeout_count,
            persist_failures: c.persist_failures,
            average_response_time,
            retry_counts: c.retry_counts.clone(),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl RetryObserver for MetricsRegistry {
    fn on_retry(&self, url: &str, _attempt: u32, _cause: &Error) {
        self.record_retry(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_registry_yields_zero_defaults() {
        let registry = MetricsRegistry::new();
        let snap = registry.snapshot();
        assert_eq!(snap.success_count, 0);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.timeout_count, 0);
        assert_eq!(snap.average_response_time, 0.0);
        assert!(snap.retry_counts.is_empty());
    }

    #[test]
    fn average_is_total_over_successes() {
        let registry = MetricsRegistry::new();
        registry.record_success(0.2);
        registry.record_success(0.4);
        let snap = registry.snapshot();
        assert_eq!(snap.success_count, 2);
        assert!((snap.average_response_time - 0.3).abs() < 1e-9);
    }

    #[test]
    fn snapshot_is_idempotent_without_writes() {
        let registry = MetricsRegistry::new();
        registry.record_success(0.1);
        registry.record_failure();
        registry.record_retry("http://a");

        let mut first = registry.snapshot();
        let mut second = registry.snapshot();
        // elapsed_seconds moves with wall time; everything else must match.
        first.elapsed_seconds = 0.0;
        second.elapsed_seconds = 0.0;
        assert_eq!(first, second);
    }

    #[test]
    fn no_lost_updates_under_concurrent_writers() {
        let registry = Arc::new(MetricsRegistry::new());
        let threads = 8;
        let per_thread = 1000u64;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        registry.record_success(0.001);
                        registry.record_failure();
                        registry.record_retry("http://shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = registry.snapshot();
        let expected = threads as u64 * per_thread;
        assert_eq!(snap.success_count, expected);
        assert_eq!(snap.failure_count, expected);
        assert_eq!(snap.retry_counts["http://shared"], expected);
        let expected_avg = 0.001;
        assert!((snap.average_response_time - expected_avg).abs() < 1e-6);
    }

    #[test]
    fn timeout_counter_is_separate_from_failures() {
        let registry = MetricsRegistry::new();
        registry.record_timeout();
        registry.record_failure();
        let snap = registry.snapshot();
        assert_eq!(snap.timeout_count, 1);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.success_count, 0);
    }
}
