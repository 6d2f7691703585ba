pub mod config;
pub mod consumer;
pub mod error;
pub mod fetcher;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod status;

pub use config::{AggregatorConfig, ConfigLoader};
pub use consumer::ConsumerPool;
pub use error::{Error, Result};
pub use fetcher::{Fetcher, HttpTransport, Transport};
pub use limiter::RateLimiter;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use pipeline::PipelineEngine;
pub use queue::{BoundedQueue, QueueSlot};
pub use record::{FailureKind, FetchOutcome, FetchRecord};
pub use retry::{RetryObserver, RetryPolicy};
pub use shutdown::{PipelineState, ShutdownCoordinator};
pub use sink::Sink;
