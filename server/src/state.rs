//! canonical rating data and the synchronization block around it.
//!
//! active users live in a slab arena addressed by [`ActiveSlot`] indices;
//! the leaderboard and the per-second ring store slots instead of pointers,
//! so there is no ownership cycle and a slot stays valid for as long as the
//! user is active regardless of arena growth.
//!
//! # access protocol
//!
//! the state is shared without a lock on the hot path. the rules:
//!
//! - workers read it only while registered in `reader_count`, and
//!   registration only happens while no refresh is in progress
//! - the calculator mutates it only after flipping the ingest buffer,
//!   raising `refresh_in_progress` and observing both the old buffer's
//!   writer count and `reader_count` at zero
//! - `refresh_in_progress` is cleared under `data_lock` and announced on
//!   `data_refreshed`, which is what hands the data back to the readers
//!
//! the unsafe accessors on [`SharedCore`] document which rule they lean on.

use podium_proto::{Monetary, UserId};
use std::cell::UnsafeCell;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::SystemTime;

/// second-of-minute a user connected at; `60` means disconnected.
pub type Second = u8;

pub const DISCONNECTED: Second = 60;
pub const SECONDS_PER_MINUTE: usize = 60;

/// a registered user with no winnings this week. not on the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilentUser {
    pub second_connected: Second,
    pub name: Vec<u8>,
}

impl SilentUser {
    pub fn named(name: Vec<u8>) -> Self {
        Self {
            second_connected: DISCONNECTED,
            name,
        }
    }
}

/// a user holding a leaderboard position.
#[derive(Debug)]
pub struct ActiveUser {
    pub id: UserId,
    pub winnings: Monetary,
    /// index into the leaderboard; refreshed after every recalculation.
    pub rating: i32,
    pub second_connected: Second,
    pub name: Vec<u8>,
}

/// not yet placed on the leaderboard.
pub const INVALID_RATING: i32 = -1;

/// stable index of an active user in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActiveSlot(u32);

impl ActiveSlot {
    /// filler for leaderboard growth during patch application; every
    /// placeholder is overwritten by an insert patch before anyone reads it.
    pub(crate) const PLACEHOLDER: ActiveSlot = ActiveSlot(u32::MAX);
}

/// slab of active users; slots are reused after removal.
#[derive(Debug, Default)]
pub struct ActiveArena {
    slots: Vec<Option<ActiveUser>>,
    free: Vec<u32>,
}

impl ActiveArena {
    pub fn insert(&mut self, user: ActiveUser) -> ActiveSlot {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(user);
                ActiveSlot(index)
            }
            None => {
                self.slots.push(Some(user));
                ActiveSlot(self.slots.len() as u32 - 1)
            }
        }
    }

    pub fn remove(&mut self, slot: ActiveSlot) -> ActiveUser {
        let user = self.slots[slot.0 as usize]
            .take()
            .expect("removing a vacant arena slot");
        self.free.push(slot.0);
        user
    }

    #[inline]
    pub fn get(&self, slot: ActiveSlot) -> &ActiveUser {
        self.slots[slot.0 as usize]
            .as_ref()
            .expect("reading a vacant arena slot")
    }

    #[inline]
    pub fn get_mut(&mut self, slot: ActiveSlot) -> &mut ActiveUser {
        self.slots[slot.0 as usize]
            .as_mut()
            .expect("writing a vacant arena slot")
    }
}

/// the canonical weekly rating data.
#[derive(Debug, Default)]
pub struct RatingState {
    pub silent: BTreeMap<UserId, SilentUser>,
    pub active: BTreeMap<UserId, ActiveSlot>,
    pub arena: ActiveArena,
    /// active users ordered by winnings descending.
    pub leaderboard: Vec<ActiveSlot>,
}

/// 60 buckets of connected active users, keyed by second-of-minute.
pub struct SecondRing {
    pub online: [HashSet<ActiveSlot>; SECONDS_PER_MINUTE],
}

impl Default for SecondRing {
    fn default() -> Self {
        Self {
            online: std::array::from_fn(|_| HashSet::new()),
        }
    }
}

impl SecondRing {
    pub fn clear(&mut self) {
        for bucket in &mut self.online {
            bucket.clear();
        }
    }
}

/// cooperative shutdown flags. `bad` stops the current session's threads;
/// `fatal` additionally forbids recovery.
#[derive(Debug, Default)]
pub struct StopSignals {
    bad: AtomicBool,
    fatal: AtomicBool,
}

impl StopSignals {
    pub fn signal_recoverable(&self) {
        self.bad.store(true, Ordering::Relaxed);
    }

    pub fn signal_fatal(&self) {
        self.fatal.store(true, Ordering::Relaxed);
        self.bad.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.bad.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Relaxed)
    }

    /// arm a fresh session. the fatal flag is sticky by design.
    pub fn reset_recoverable(&self) {
        self.bad.store(false, Ordering::Relaxed);
    }
}

/// locks, condvar and counters choreographing the refresh barrier.
#[derive(Debug, Default)]
pub struct SyncBlock {
    pub data_lock: Mutex<()>,
    pub data_refreshed: Condvar,
    pub refresh_in_progress: AtomicBool,
    pub reader_count: AtomicI32,
    pub stop: StopSignals,
}

/// rating state, ring and week bookkeeping shared by every thread.
pub struct SharedCore {
    state: UnsafeCell<RatingState>,
    ring: UnsafeCell<SecondRing>,
    /// start of the week currently served; owned by the announcer thread.
    week_start: UnsafeCell<Option<SystemTime>>,
    pub sync: SyncBlock,
}

// safety: the UnsafeCell fields are governed by the access protocol in the
// module docs; SyncBlock is built from Sync primitives
unsafe impl Sync for SharedCore {}

impl SharedCore {
    pub fn new() -> Self {
        Self {
            state: UnsafeCell::new(RatingState::default()),
            ring: UnsafeCell::new(SecondRing::default()),
            week_start: UnsafeCell::new(None),
            sync: SyncBlock::default(),
        }
    }

    /// # safety
    ///
    /// the caller must hold a reader slot (`reader_count` registration), or
    /// be the calculator/announcer thread outside a refresh.
    #[inline]
    pub unsafe fn state(&self) -> &RatingState {
        unsafe { &*self.state.get() }
    }

    /// # safety
    ///
    /// calculator only, after the two-phase quiescence barrier (old-buffer
    /// writer count and `reader_count` both observed at zero).
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn state_mut(&self) -> &mut RatingState {
        unsafe { &mut *self.state.get() }
    }

    /// # safety
    ///
    /// the ring is read by the announcer between recalculations and mutated
    /// only by the calculator, which runs on the announcer thread; no other
    /// thread may touch it.
    #[inline]
    pub unsafe fn ring(&self) -> &SecondRing {
        unsafe { &*self.ring.get() }
    }

    /// # safety
    ///
    /// calculator only, under the same conditions as [`state_mut`].
    ///
    /// [`state_mut`]: SharedCore::state_mut
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn ring_mut(&self) -> &mut SecondRing {
        unsafe { &mut *self.ring.get() }
    }

    /// # safety
    ///
    /// announcer thread only.
    #[inline]
    pub unsafe fn week_start(&self) -> Option<SystemTime> {
        unsafe { *self.week_start.get() }
    }

    /// # safety
    ///
    /// announcer thread only.
    #[inline]
    pub unsafe fn set_week_start(&self, start: SystemTime) {
        unsafe {
            *self.week_start.get() = Some(start);
        }
    }
}

impl Default for SharedCore {
    fn default() -> Self {
        Self::new()
    }
}
