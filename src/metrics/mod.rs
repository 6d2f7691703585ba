pub mod registry;
pub mod snapshot;

pub use registry::MetricsRegistry;
pub use snapshot::MetricsSnapshot;
