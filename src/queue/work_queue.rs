//! Blocking multi-producer / multi-consumer FIFO.
//!
//! [`WorkQueue`] pairs a short-critical-section mutex over a `VecDeque` with a
//! [`tokio::sync::Notify`] that plays the role of a condition variable.
//! Producers never block; consumers suspend in [`WorkQueue::wait_and_pop`]
//! until an item is available.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Unbounded FIFO connecting producers to a consumer loop.
///
/// Used for inbound requests (drained by the dispatcher) and for audit
/// records (drained by the audit writer).
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Pops the head item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_front();
        // Hand the wakeup on if more work is queued behind this item.
        if item.is_some() && !items.is_empty() {
            self.available.notify_one();
        }
        item
    }

    /// Pops the head item, suspending until one is available.
    ///
    /// Cancel-safe: dropping the returned future never loses an item.
    pub async fn wait_and_pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.available.notified().await;
        }
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
