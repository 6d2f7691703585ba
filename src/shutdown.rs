use crate::consumer::ConsumerPool;
use crate::queue::{BoundedQueue, QueueSlot};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, watch};

/// Pipeline lifecycle, published on a watch channel so any stage can observe
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Stopping,
    Stopped,
}

/// Orchestrates an ordered stop: production halts first, then the queue
/// drains, and only then are idle consumers released. Stopping consumers
/// before the drain completes would strand queued records.
///
/// The OS signal handler is an external collaborator that merely calls
/// [`ShutdownCoordinator::request_stop`]; no work is spawned from it.
pub struct ShutdownCoordinator {
    state: watch::Sender<PipelineState>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        let (state, _) = watch::channel(PipelineState::Running);
        Self {
            state,
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Request an early stop. Idempotent; notifies all waiters once.
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            self.stop_notify.notify_waiters();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Wait until a stop is requested. Returns immediately if already set.
    pub async fn wait_for_stop(&self) {
        let notified = self.stop_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stop_requested() {
            return;
        }
        notified.await;
    }

    fn transition(&self, next: PipelineState) {
        self.state.send_replace(next);
        log::info!("Pipeline state: {:?}", next);
    }

    /// Run the ordered stop sequence once production has reached a terminal
    /// state (or a stop was requested): drain the queue, release one close
    /// marker per worker, join the pool.
    pub async fn shutdown(&self, queue: &BoundedQueue, pool: ConsumerPool) {
        self.request_stop();
        self.transition(PipelineState::Draining);
        queue.join_all_consumed().await;

        self.transition(PipelineState::Stopping);
        // Best-effort close markers wake idle waiters immediately; any worker
        // that misses one still exits on its next bounded-wait check, since
        // the state has left Running and the queue is drained.
        for _ in 0..pool.len() {
            if !queue.try_put(QueueSlot::Close) {
                break;
            }
        }
        pool.join().await;

        self.transition(PipelineState::Stopped);
    }
}
