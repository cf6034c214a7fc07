//! consumer handle for the MPSC channel.

use super::queue::Shared;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// receiving side of the channel. exactly one exists per channel.
///
/// `try_pop` takes `&mut self` and the type is not `Clone`, which is what
/// upholds the queue's single-consumer contract.
pub struct Consumer<T> {
    pub(super) shared: Arc<Shared<T>>,
}

impl<T> Consumer<T> {
    /// pop the next event, if one is linked in.
    ///
    /// never blocks. a `None` means the queue is empty *right now* - a
    /// producer mid-push may have claimed the tail without linking yet, in
    /// which case the value shows up on a later call.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        self.shared.try_pop()
    }

    /// true when every producer handle has been dropped.
    ///
    /// events already queued are still returned by `try_pop`; combine the
    /// two to drain a closed channel to completion.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.shared.producer_count.load(Ordering::Acquire) == 0
    }
}

// safety: the consumer can move between threads; single-consumer use is
// enforced by &mut self and the absence of Clone
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> core::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("mpsc::Consumer")
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}
