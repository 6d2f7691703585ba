use crate::error::{Error, Result};
use crate::limiter::RateLimiter;
use crate::metrics::MetricsRegistry;
use crate::queue::{BoundedQueue, QueueSlot};
use crate::record::{FailureKind, FetchOutcome, FetchRecord};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownCoordinator;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One network call: fetch `url` within `deadline`, returning the body and
/// the observed latency in seconds. The pipeline treats this as an opaque
/// fallible operation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, url: &str, deadline: Duration) -> Result<(String, f64)>;
}

/// reqwest-backed transport with a per-request deadline.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent("market-aggregator/0.1")
            .build()
            .expect("Building HTTP client");
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, url: &str, deadline: Duration) -> Result<(String, f64)> {
        let start = Instant::now();
        let map_timeout = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::Timeout {
                    url: url.to_string(),
                }
            } else {
                Error::Http(e)
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(deadline)
            .send()
            .await
            .map_err(map_timeout)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let content = response.text().await.map_err(map_timeout)?;
        let latency = start.elapsed().as_secs_f64();
        Ok((content, latency))
    }
}

/// Producer stage: rate-limited, retrying fetches feeding the bounded queue.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    deadline: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        deadline: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            deadline,
            metrics,
        }
    }

    /// Perform one logical fetch: permit, retried transport call, terminal
    /// classification. Every call ends in exactly one success or one failure
    /// recording.
    pub async fn fetch_one(&self, url: &str) -> FetchOutcome {
        match self.try_fetch(url).await {
            Ok(record) => {
                self.metrics.record_success(record.latency_seconds);
                FetchOutcome::Success(record)
            }
            Err(cause) => {
                let kind = FailureKind::classify(&cause);
                if kind == FailureKind::Timeout {
                    self.metrics.record_timeout();
                }
                self.metrics.record_failure();
                FetchOutcome::Failure {
                    kind,
                    url: url.to_string(),
                    cause,
                }
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<FetchRecord> {
        // Malformed URLs are programmer/input errors; fail before spending a
        // rate-limit permit or any retry budget.
        url::Url::parse(url)?;

        let wait_start = Instant::now();
        self.limiter.acquire().await;
        let waited = wait_start.elapsed();
        if waited > Duration::from_millis(10) {
            log::info!(
                "Rate limited: waited {:.2}s before fetching {}",
                waited.as_secs_f64(),
                url
            );
        }

        let (content, latency) = self
            .retry
            .run(url, self.metrics.as_ref(), || {
                self.transport.perform(url, self.deadline)
            })
            .await?;

        Ok(FetchRecord::new(url.to_string(), latency, content))
    }

    async fn produce_one(
        &self,
        url: &str,
        queue: &BoundedQueue,
        coordinator: &ShutdownCoordinator,
    ) -> Result<bool> {
        if coordinator.is_stop_requested() {
            log::info!("Skipping {} (stop requested)", url);
            return Ok(false);
        }

        match self.fetch_one(url).await {
            FetchOutcome::Success(record) => {
                queue.put(QueueSlot::Record(record)).await;
                log::info!("Enqueued data for {} (queue size: {})", url, queue.size());
                Ok(true)
            }
            FetchOutcome::Failure { kind, url, cause } => {
                log::error!("Fetch failed ({:?}) for {}: {}", kind, url, cause);
                Err(cause)
            }
        }
    }

    /// Fetch every URL concurrently, enqueueing each success. Returns only
    /// after every fetch reaches a terminal state; sibling fetches are never
    /// abandoned when one fails. The first terminal failure, if any, is the
    /// overall result; the count of enqueued records otherwise. URLs whose
    /// fetch has not started when a stop is requested are skipped.
    pub async fn produce_all(
        &self,
        urls: &[String],
        queue: &BoundedQueue,
        coordinator: &ShutdownCoordinator,
    ) -> Result<usize> {
        let results = futures::future::join_all(
            urls.iter()
                .map(|url| self.produce_one(url, queue, coordinator)),
        )
        .await;

        let mut produced = 0;
        let mut skipped = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(true) => produced += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if skipped > 0 {
            log::info!("Skipped {} urls after stop request", skipped);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(produced),
        }
    }
}
