use crate::limiter::RateLimiter;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AggregatorConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    #[validate(length(min = 1))]
    pub urls: Vec<String>,

    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    #[serde(default = "default_consumers")]
    #[validate(range(min = 1))]
    pub consumers: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-request network deadline in milliseconds.
    #[serde(default = "default_fetch_deadline_ms")]
    pub fetch_deadline_ms: u64,

    /// How long an idle consumer waits on the queue before rechecking the
    /// stop condition.
    #[serde(default = "default_consumer_wait_ms")]
    pub consumer_wait_ms: u64,

    /// Bind address for the status/metrics HTTP surface, e.g. "0.0.0.0:8000".
    /// The surface is not started when absent.
    #[serde(default)]
    pub status_addr: Option<String>,

    #[serde(default)]
    pub sink: Option<SinkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 5,
            window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Console,
    Json {
        path: String,
    },
    Csv {
        path: String,
    },
    Sqlite {
        path: String,
        #[serde(default = "default_table_name")]
        table: String,
    },
}

impl AggregatorConfig {
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.rate_limit.requests,
            Duration::from_millis(self.rate_limit.window_ms),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        )
    }

    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_millis(self.fetch_deadline_ms)
    }

    pub fn consumer_wait(&self) -> Duration {
        Duration::from_millis(self.consumer_wait_ms)
    }
}

fn default_queue_capacity() -> usize {
    10
}

fn default_consumers() -> usize {
    3
}

fn default_fetch_deadline_ms() -> u64 {
    10_000
}

fn default_consumer_wait_ms() -> u64 {
    1000
}

fn default_table_name() -> String {
    "market_data".to_string()
}
