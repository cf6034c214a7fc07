//! double-buffered staging for decoded client events.
//!
//! the router appends into whichever buffer is current; once a minute the
//! calculator flips `current` and drains the other side. the only point of
//! contact is the flip, which makes the router's writes on the hot path
//! contention-free.
//!
//! the buffers use ordered maps so that a minute's worth of events folds
//! into the rating data in a deterministic order regardless of how the
//! ingest interleaved.

use crate::state::Second;
use podium_channel::wait_backoff;
use podium_cpu::CachePadded;
use podium_proto::{Monetary, UserId};
use std::cell::UnsafeCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// events staged between two recalculations.
#[derive(Debug, Default)]
pub struct IngestEvents {
    /// newly registered users and their names.
    pub registered: BTreeMap<UserId, Vec<u8>>,
    /// latest rename per user.
    pub renamed: BTreeMap<UserId, Vec<u8>>,
    /// latest connection change per user; `DISCONNECTED` for a disconnect.
    pub connection_changes: BTreeMap<UserId, Second>,
    /// deal amounts summed per user.
    pub deals_won: BTreeMap<UserId, Monetary>,
}

impl IngestEvents {
    pub fn stage_deal(&mut self, id: UserId, amount: Monetary) {
        *self.deals_won.entry(id).or_insert(0) += amount;
    }
}

struct BufferCell {
    events: UnsafeCell<IngestEvents>,
    /// producers currently attached to this buffer.
    writer_count: CachePadded<AtomicU32>,
}

impl BufferCell {
    fn new() -> Self {
        Self {
            events: UnsafeCell::new(IngestEvents::default()),
            writer_count: CachePadded::new(AtomicU32::new(0)),
        }
    }
}

/// the two staging buffers and the atomic current-generation index.
pub struct DoubleBuffer {
    cells: [BufferCell; 2],
    current: AtomicUsize,
}

// safety: a buffer's events are written only by attached producers and read
// by the calculator only after flip_current() + wait_writers_gone() proved
// every producer has detached; writer_count carries the release/acquire
// edge between the two
unsafe impl Sync for DoubleBuffer {}
unsafe impl Send for DoubleBuffer {}

impl DoubleBuffer {
    pub fn new() -> Self {
        Self {
            cells: [BufferCell::new(), BufferCell::new()],
            current: AtomicUsize::new(0),
        }
    }

    /// attach a producer to the current buffer; returns the index attached
    /// to, which must be passed back to `detach`/`reattach`.
    pub fn attach(&self) -> usize {
        // acquire pairs with the calculator's release flip, so an attach
        // that observes the new index also observes the drained buffer
        let index = self.current.load(Ordering::Acquire);
        self.cells[index].writer_count.fetch_add(1, Ordering::Relaxed);
        index
    }

    /// detach a producer from the buffer it was attached to.
    pub fn detach(&self, attached: usize) {
        // release publishes every event written before the detach to the
        // calculator's acquire spin in wait_writers_gone()
        self.cells[attached]
            .writer_count
            .fetch_sub(1, Ordering::Release);
    }

    /// follow a flip if one happened; returns the (possibly new) index.
    pub fn reattach(&self, attached: usize) -> usize {
        let index = self.current.load(Ordering::Acquire);
        if index != attached {
            self.detach(attached);
            self.cells[index].writer_count.fetch_add(1, Ordering::Relaxed);
        }
        index
    }

    /// events of the buffer a producer is attached to.
    ///
    /// # safety
    ///
    /// the caller must be attached to `attached` and be the only producer
    /// thread (single-router design; the writer count tolerates more, the
    /// events map does not).
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn events_mut(&self, attached: usize) -> &mut IngestEvents {
        unsafe { &mut *self.cells[attached].events.get() }
    }

    /// redirect producers to the other buffer; returns the old index.
    ///
    /// calculator only. the release store starts the hand-off; call
    /// `wait_writers_gone` before touching the old buffer.
    pub fn flip_current(&self) -> usize {
        let old = self.current.load(Ordering::Relaxed);
        self.current.store(1 - old, Ordering::Release);
        old
    }

    /// spin until every producer has detached from buffer `index`.
    pub fn wait_writers_gone(&self, index: usize) {
        let mut iteration = 0u32;
        while self.cells[index].writer_count.load(Ordering::Acquire) != 0 {
            wait_backoff(&mut iteration);
        }
    }

    /// drained side of the buffer pair, for the calculator to consume.
    ///
    /// # safety
    ///
    /// only after `flip_current` returned `index` and `wait_writers_gone`
    /// observed its writer count at zero, and only until the next flip.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn drained_events(&self, index: usize) -> &mut IngestEvents {
        unsafe { &mut *self.cells[index].events.get() }
    }
}

impl Default for DoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_deal_amounts_sum() {
        let mut events = IngestEvents::default();
        events.stage_deal(1, 100);
        events.stage_deal(1, 50);
        events.stage_deal(2, 7);

        assert_eq!(events.deals_won[&1], 150);
        assert_eq!(events.deals_won[&2], 7);
    }

    #[test]
    fn test_latest_connection_change_wins() {
        let mut events = IngestEvents::default();
        events.connection_changes.insert(1, 10);
        events.connection_changes.insert(1, 42);
        assert_eq!(events.connection_changes[&1], 42);
    }

    #[test]
    fn test_flip_swaps_sides() {
        let buffer = DoubleBuffer::new();

        let attached = buffer.attach();
        // safety: attached, single test thread
        unsafe { buffer.events_mut(attached) }.stage_deal(1, 100);
        buffer.detach(attached);

        let old = buffer.flip_current();
        buffer.wait_writers_gone(old);
        assert_eq!(old, attached);

        // safety: flipped and quiesced above
        let drained = unsafe { buffer.drained_events(old) };
        assert_eq!(drained.deals_won[&1], 100);

        // new attachments land on the other side
        let reattached = buffer.attach();
        assert_ne!(reattached, old);
        buffer.detach(reattached);
    }

    #[test]
    fn test_reattach_follows_flip() {
        let buffer = DoubleBuffer::new();

        let attached = buffer.attach();
        assert_eq!(buffer.reattach(attached), attached);

        let old = buffer.flip_current();
        let reattached = buffer.reattach(attached);
        assert_ne!(reattached, old);

        buffer.wait_writers_gone(old);
        buffer.detach(reattached);
    }

    #[test]
    fn test_flip_quiesces_against_live_writer() {
        let buffer = Arc::new(DoubleBuffer::new());
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut attached = buffer.attach();
                let mut staged = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    attached = buffer.reattach(attached);
                    // safety: attached, sole producer thread
                    unsafe { buffer.events_mut(attached) }.stage_deal(1, 1);
                    staged += 1;
                }
                buffer.detach(attached);
                staged
            })
        };

        let mut drained = 0i64;
        for _ in 0..100 {
            let old = buffer.flip_current();
            buffer.wait_writers_gone(old);
            // safety: flipped and quiesced
            let events = unsafe { buffer.drained_events(old) };
            drained += events.deals_won.remove(&1).unwrap_or(0);
        }

        stop.store(true, Ordering::Relaxed);
        let staged = writer.join().unwrap();

        // whatever was not drained is still split across the two buffers
        for index in 0..2 {
            buffer.wait_writers_gone(index);
            // safety: writer thread has exited
            let events = unsafe { buffer.drained_events(index) };
            drained += events.deals_won.remove(&1).unwrap_or(0);
        }

        assert_eq!(drained as u64, staged);
    }
}
