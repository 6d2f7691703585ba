use crate::config::AggregatorConfig;
use crate::consumer::ConsumerPool;
use crate::error::Result;
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownCoordinator;
use crate::sink::Sink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Wires the stages together: rate-limited fetchers feeding the bounded
/// queue, a consumer pool draining it into the sink, and the coordinator
/// sequencing the stop.
pub struct PipelineEngine {
    config: AggregatorConfig,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl PipelineEngine {
    pub fn new(config: AggregatorConfig, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self {
            config,
            transport: Arc::new(HttpTransport::new()),
            metrics: metrics.unwrap_or_else(|| Arc::new(MetricsRegistry::new())),
            coordinator: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Swap the network transport, mainly for tests.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Handle for the external stop signal; an OS signal handler should do
    /// nothing but call `request_stop` on it.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    /// Run the pipeline to completion: every URL reaches a terminal state,
    /// the queue drains, the workers exit, the sink closes. Returns the
    /// number of records produced, or the first terminal fetch failure.
    pub async fn run(&self, sink: Arc<dyn Sink>) -> Result<usize> {
        self.metrics.mark_started();
        let started = Instant::now();

        let queue = Arc::new(BoundedQueue::new(
            self.config.queue_capacity,
            self.metrics.clone(),
        ));
        let pool = ConsumerPool::spawn(
            self.config.consumers,
            self.config.consumer_wait(),
            queue.clone(),
            sink.clone(),
            self.coordinator.clone(),
            self.metrics.clone(),
        );

        let fetcher = Fetcher::new(
            self.transport.clone(),
            self.config.rate_limiter(),
            self.config.retry_policy(),
            self.config.fetch_deadline(),
            self.metrics.clone(),
        );

        let producer_result = fetcher
            .produce_all(&self.config.urls, &queue, &self.coordinator)
            .await;

        // Production is terminal; drain, then release the workers.
        self.coordinator.shutdown(&queue, pool).await;

        if let Err(e) = sink.close().await {
            log::error!("Error closing sink: {}", e);
        }

        let elapsed = started.elapsed().as_secs_f64();
        match &producer_result {
            Ok(produced) => log::info!(
                "Fetched and processed {} of {} urls in {:.2}s",
                produced,
                self.config.urls.len(),
                elapsed
            ),
            Err(e) => log::error!(
                "Pipeline finished with a fetch failure after {:.2}s: {}",
                elapsed,
                e
            ),
        }

        producer_result
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Periodically publishes snapshots for progress reporting.
    pub fn watch_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        let (tx, rx) = watch::channel(self.metrics.snapshot());
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                if tx.send(metrics.snapshot()).is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, RetryConfig};
    use crate::error::Error;
    use crate::record::FetchRecord;
    use crate::shutdown::PipelineState;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticTransport;

    #[async_trait]
    impl Transport for StaticTransport {
        async fn perform(&self, _url: &str, _deadline: Duration) -> crate::error::Result<(String, f64)> {
            Ok(("body".to_string(), 0.01))
        }
    }

    struct RecordingSink {
        persisted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn persist(&self, record: &FetchRecord) -> crate::error::Result<()> {
            self.persisted.lock().unwrap().push(record.url.clone());
            Ok(())
        }
    }

    fn config(urls: Vec<String>) -> AggregatorConfig {
        AggregatorConfig {
            name: "test".into(),
            urls,
            queue_capacity: 2,
            consumers: 2,
            rate_limit: RateLimitConfig {
                requests: 100,
                window_ms: 1000,
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            fetch_deadline_ms: 1000,
            consumer_wait_ms: 50,
            status_addr: None,
            sink: None,
        }
    }

    #[tokio::test]
    async fn runs_to_stopped_and_persists_everything() {
        let urls: Vec<String> = (0..7).map(|i| format!("http://example.com/{}", i)).collect();
        let engine =
            PipelineEngine::new(config(urls.clone()), None).with_transport(Arc::new(StaticTransport));
        let sink = Arc::new(RecordingSink {
            persisted: Mutex::new(Vec::new()),
        });

        let produced = engine.run(sink.clone()).await.unwrap();

        assert_eq!(produced, 7);
        assert_eq!(sink.persisted.lock().unwrap().len(), 7);
        assert_eq!(engine.coordinator().state(), PipelineState::Stopped);

        let snap = engine.get_metrics();
        assert_eq!(snap.success_count, 7);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.queue_size, 0);
    }

    #[tokio::test]
    async fn fetch_failure_still_drains_and_surfaces() {
        struct HalfBadTransport;

        #[async_trait]
        impl Transport for HalfBadTransport {
            async fn perform(
                &self,
                url: &str,
                _deadline: Duration,
            ) -> crate::error::Result<(String, f64)> {
                if url.ends_with("/bad") {
                    Err(Error::HttpStatus {
                        url: url.to_string(),
                        status: reqwest::StatusCode::NOT_FOUND,
                    })
                } else {
                    Ok(("body".to_string(), 0.01))
                }
            }
        }

        let urls = vec![
            "http://example.com/a".to_string(),
            "http://example.com/bad".to_string(),
            "http://example.com/b".to_string(),
        ];
        let engine =
            PipelineEngine::new(config(urls), None).with_transport(Arc::new(HalfBadTransport));
        let sink = Arc::new(RecordingSink {
            persisted: Mutex::new(Vec::new()),
        });

        let result = engine.run(sink.clone()).await;

        assert!(result.is_err());
        assert_eq!(sink.persisted.lock().unwrap().len(), 2);
        assert_eq!(engine.coordinator().state(), PipelineState::Stopped);
    }
}
