use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time view over the registry, computed on demand and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub queue_size: usize,
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub persist_failures: u64,
    pub average_response_time: f64,
    pub retry_counts: HashMap<String, u64>,
    pub elapsed_seconds: f64,
}
