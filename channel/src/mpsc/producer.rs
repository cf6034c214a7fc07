//! producer handle for the MPSC channel.

use super::queue::Shared;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// sending side of the channel.
///
/// clone freely - every clone may push from its own thread concurrently.
/// all operations take `&self`.
pub struct Producer<T> {
    pub(super) shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    /// push an event onto the queue.
    ///
    /// never blocks and never fails; the queue is unbounded, so the only
    /// way this goes wrong is allocation failure, which aborts anyway.
    #[inline]
    pub fn push(&self, event: T) {
        self.shared.push(event);
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        self.shared.producer_count.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.producer_count.fetch_sub(1, Ordering::AcqRel);
    }
}

// safety: pushes synchronize through the queue atomics
unsafe impl<T: Send> Send for Producer<T> {}
unsafe impl<T: Send> Sync for Producer<T> {}

impl<T> core::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("mpsc::Producer")
            .field(
                "producer_count",
                &self.shared.producer_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}
