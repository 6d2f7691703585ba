pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{AggregatorConfig, RateLimitConfig, RetryConfig, SinkConfig};
