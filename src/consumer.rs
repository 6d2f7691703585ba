use crate::metrics::MetricsRegistry;
use crate::queue::{BoundedQueue, QueueSlot};
use crate::shutdown::{PipelineState, ShutdownCoordinator};
use crate::sink::Sink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Pool of independent workers draining the queue into the sink.
///
/// Each worker waits on `take` under a bounded timeout so it can observe the
/// stop condition while idle, and exits on a close marker or once the
/// pipeline has left `Running` with the queue empty. A persist is never
/// interrupted; cancellation only happens between slots.
pub struct ConsumerPool {
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerPool {
    pub fn spawn(
        count: usize,
        wait: Duration,
        queue: Arc<BoundedQueue>,
        sink: Arc<dyn Sink>,
        coordinator: Arc<ShutdownCoordinator>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let handles = (0..count)
            .map(|id| {
                let queue = queue.clone();
                let sink = sink.clone();
                let coordinator = coordinator.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    worker(id + 1, wait, queue, sink, coordinator, metrics).await;
                })
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Consumer worker panicked: {}", e);
            }
        }
    }
}

async fn worker(
    id: usize,
    wait: Duration,
    queue: Arc<BoundedQueue>,
    sink: Arc<dyn Sink>,
    coordinator: Arc<ShutdownCoordinator>,
    metrics: Arc<MetricsRegistry>,
) {
    log::debug!("Consumer {} started", id);
    loop {
        let slot = match timeout(wait, queue.take()).await {
            Ok(slot) => slot,
            Err(_) => {
                // Only exit once production is terminal (state past Running);
                // a stop request alone may still have in-flight fetches that
                // will enqueue.
                if coordinator.state() != PipelineState::Running && queue.is_empty() {
                    break;
                }
                continue;
            }
        };

        match slot {
            QueueSlot::Close => break,
            QueueSlot::Record(record) => {
                match sink.persist(&record).await {
                    Ok(()) => {
                        log::info!("Consumer {} wrote record from {}", id, record.url);
                    }
                    Err(e) => {
                        // Persist failures are isolated per record: counted and
                        // logged, the worker keeps draining.
                        log::error!("Consumer {} failed to persist {}: {}", id, record.url, e);
                        metrics.record_persist_failure();
                    }
                }
                queue.task_done();
            }
        }
    }
    log::debug!("Consumer {} exiting", id);
}
