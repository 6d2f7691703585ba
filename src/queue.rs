use crate::metrics::MetricsRegistry;
use crate::record::FetchRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

/// A queue entry: a record to persist, or a close marker that terminates one
/// consumer without relying on a shared-flag check alone.
#[derive(Debug)]
pub enum QueueSlot {
    Record(FetchRecord),
    Close,
}

/// Fixed-capacity FIFO buffer between producers and consumers.
///
/// `put` blocks while full and `take` blocks while empty, both on semaphore
/// permits rather than a poll loop, so the capacity bound is exact. The queue
/// reports its depth to the registry on every put and take.
pub struct BoundedQueue {
    slots: Mutex<VecDeque<QueueSlot>>,
    free: Semaphore,
    filled: Semaphore,
    capacity: usize,
    outstanding: AtomicUsize,
    drained: Notify,
    metrics: Arc<MetricsRegistry>,
}

impl BoundedQueue {
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
            outstanding: AtomicUsize::new(0),
            drained: Notify::new(),
            metrics,
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, VecDeque<QueueSlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue one slot, waiting while the queue is at capacity. This is the
    /// backpressure point: items are never dropped and the queue never grows
    /// past its capacity.
    pub async fn put(&self, slot: QueueSlot) {
        self.free
            .acquire()
            .await
            .expect("queue semaphore never closes")
            .forget();

        if matches!(slot, QueueSlot::Record(_)) {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
        }

        let depth = {
            let mut slots = self.locked();
            slots.push_back(slot);
            slots.len()
        };
        self.metrics.set_queue_depth(depth);
        self.filled.add_permits(1);
    }

    /// Non-blocking put: enqueue only if a slot is free right now. Used when
    /// offering close markers during shutdown, where blocking could wait on
    /// workers that have already exited.
    pub fn try_put(&self, slot: QueueSlot) -> bool {
        let permit = match self.free.try_acquire() {
            Ok(permit) => permit,
            Err(_) => return false,
        };
        permit.forget();

        if matches!(slot, QueueSlot::Record(_)) {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
        }

        let depth = {
            let mut slots = self.locked();
            slots.push_back(slot);
            slots.len()
        };
        self.metrics.set_queue_depth(depth);
        self.filled.add_permits(1);
        true
    }

    /// Dequeue the oldest slot, waiting while the queue is empty.
    pub async fn take(&self) -> QueueSlot {
        self.filled
            .acquire()
            .await
            .expect("queue semaphore never closes")
            .forget();

        let (slot, depth) = {
            let mut slots = self.locked();
            let slot = slots
                .pop_front()
                .expect("filled permit implies a queued slot");
            (slot, slots.len())
        };
        self.metrics.set_queue_depth(depth);
        self.free.add_permits(1);
        slot
    }

    pub fn size(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mark one taken record as fully processed. Called by a consumer after
    /// the persist attempt, successful or not.
    pub fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every record ever put has been taken and marked processed.
    /// Close markers are not counted; they carry no work.
    pub async fn join_all_consumed(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
