//! job fan-out from the ingest side to the worker pool.
//!
//! every worker owns one [`QueuePack`] of three MPSC queues; producers pick
//! a destination pack round-robin with a per-thread counter, so the fan-out
//! needs no shared state beyond the queues themselves.

use crate::state::ActiveSlot;
use podium_channel::mpsc;
use podium_proto::{ProtocolError, UserId};
use std::cell::Cell;
use std::thread::LocalKey;

/// "send a rating for this id".
///
/// `promised` means the enqueuing side guarantees the id exists even if the
/// user maps do not know it yet - set when the registration is still staged
/// in the ingest buffer. workers then answer with the one-past-the-end
/// sentinel instead of an unrecognized-user error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdJob {
    pub id: UserId,
    pub promised: bool,
}

struct PackProducers {
    errors: mpsc::Producer<ProtocolError>,
    user_ids: mpsc::Producer<UserIdJob>,
    user_data: mpsc::Producer<ActiveSlot>,
}

/// consuming side of one worker's queues.
pub struct QueuePack {
    pub errors: mpsc::Consumer<ProtocolError>,
    pub user_ids: mpsc::Consumer<UserIdJob>,
    pub user_data: mpsc::Consumer<ActiveSlot>,
}

/// fans jobs out across the worker queue packs.
pub struct JobDispatcher {
    packs: Vec<PackProducers>,
}

thread_local! {
    static ERROR_RR: Cell<usize> = const { Cell::new(0) };
    static USER_ID_RR: Cell<usize> = const { Cell::new(0) };
    static USER_DATA_RR: Cell<usize> = const { Cell::new(0) };
}

#[inline]
fn next_index(counter: &'static LocalKey<Cell<usize>>, packs: usize) -> usize {
    counter.with(|cell| {
        let index = cell.get();
        cell.set(index.wrapping_add(1));
        index % packs
    })
}

impl JobDispatcher {
    /// build a dispatcher and the matching consumers, one per worker.
    pub fn new(concurrency: usize) -> (Self, Vec<QueuePack>) {
        assert!(concurrency > 0, "dispatcher needs at least one pack");

        let mut packs = Vec::with_capacity(concurrency);
        let mut consumers = Vec::with_capacity(concurrency);

        for _ in 0..concurrency {
            let (error_tx, error_rx) = mpsc::channel();
            let (id_tx, id_rx) = mpsc::channel();
            let (data_tx, data_rx) = mpsc::channel();

            packs.push(PackProducers {
                errors: error_tx,
                user_ids: id_tx,
                user_data: data_tx,
            });
            consumers.push(QueuePack {
                errors: error_rx,
                user_ids: id_rx,
                user_data: data_rx,
            });
        }

        (Self { packs }, consumers)
    }

    pub fn enqueue_error(&self, error: ProtocolError) {
        let index = next_index(&ERROR_RR, self.packs.len());
        self.packs[index].errors.push(error);
    }

    pub fn enqueue_user_id(&self, job: UserIdJob) {
        let index = next_index(&USER_ID_RR, self.packs.len());
        self.packs[index].user_ids.push(job);
    }

    pub fn enqueue_user_data(&self, slot: ActiveSlot) {
        let index = next_index(&USER_DATA_RR, self.packs.len());
        self.packs[index].user_data.push(slot);
    }
}
