//! minutely rating recalculation.
//!
//! the calculator owns the only mutating path through the rating data. a
//! recalculation opens the barrier (flip the ingest buffer, wait out its
//! writers, wait out the worker readers), folds the drained events into the
//! user maps, rewrites the leaderboard with an incremental patch pass and
//! then releases the workers through the condvar.
//!
//! per-user protocol errors discovered while folding are enqueued as jobs,
//! never raised: one bad event must not abort a recalculation.

use crate::ingest::{DoubleBuffer, IngestEvents};
use crate::jobs::JobDispatcher;
use crate::state::{
    ActiveArena, ActiveSlot, ActiveUser, RatingState, SecondRing, SharedCore, SilentUser,
    DISCONNECTED, INVALID_RATING,
};
use podium_channel::wait_backoff;
use podium_proto::{Monetary, ProtocolError, UserId};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub struct RatingCalculator {
    shared: Arc<SharedCore>,
    ingest: Arc<DoubleBuffer>,
    dispatcher: Arc<JobDispatcher>,
}

impl RatingCalculator {
    pub fn new(
        shared: Arc<SharedCore>,
        ingest: Arc<DoubleBuffer>,
        dispatcher: Arc<JobDispatcher>,
    ) -> Self {
        Self {
            shared,
            ingest,
            dispatcher,
        }
    }

    /// fold the last minute of ingest into the leaderboard.
    ///
    /// with `drop_old_rating` the week is reset first: every active user
    /// returns to silent with their name kept and winnings discarded.
    pub fn recalculate(&self, drop_old_rating: bool) {
        // barrier open: redirect the router, then tell workers to park
        let old = self.ingest.flip_current();
        self.shared
            .sync
            .refresh_in_progress
            .store(true, Ordering::Relaxed);

        // ingest quiescence: the router's release detach pairs with this
        self.ingest.wait_writers_gone(old);

        // reader quiescence: workers drain their data jobs, then leave
        let mut iteration = 0u32;
        while self.shared.sync.reader_count.load(Ordering::Acquire) != 0 {
            wait_backoff(&mut iteration);
        }

        {
            // safety: writers are off the flipped buffer and every reader
            // is parked, so this thread has the data exclusively
            let events = unsafe { self.ingest.drained_events(old) };
            let state = unsafe { self.shared.state_mut() };
            let ring = unsafe { self.shared.ring_mut() };

            RecalcPass::new(state, ring, &self.dispatcher).run(events, drop_old_rating);
        }

        // barrier close. clearing the flag under the lock closes the gap
        // where a worker has decremented the reader count but not yet
        // started waiting - it either sees the flag down before waiting or
        // is caught by notify_all
        {
            let _guard = self
                .shared
                .sync
                .data_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.shared
                .sync
                .refresh_in_progress
                .store(false, Ordering::Relaxed);
        }
        self.shared.sync.data_refreshed.notify_all();
    }
}

/// planned leaderboard mutation, keyed by distance from the tail.
///
/// inserts sort before removals on equal distance: a user whose position
/// does not change produces a pair at the same distance, and only this
/// order keeps the running offset from dipping below zero mid-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PatchKind {
    Insert,
    Remove,
}

#[derive(Debug)]
struct RatingPatch {
    elements_after: i32,
    kind: PatchKind,
    amount: Monetary,
    /// user to place; `None` for removals.
    slot: Option<ActiveSlot>,
}

struct RecalcPass<'a> {
    state: &'a mut RatingState,
    ring: &'a mut SecondRing,
    dispatcher: &'a JobDispatcher,
    patches: Vec<RatingPatch>,
    fresh_ratings: i32,
}

impl<'a> RecalcPass<'a> {
    fn new(
        state: &'a mut RatingState,
        ring: &'a mut SecondRing,
        dispatcher: &'a JobDispatcher,
    ) -> Self {
        Self {
            state,
            ring,
            dispatcher,
            patches: Vec::new(),
            fresh_ratings: 0,
        }
    }

    fn run(mut self, events: &mut IngestEvents, drop_old_rating: bool) {
        if drop_old_rating {
            self.drop_rating();
        }

        self.process_registrations(events);
        self.process_renames(events);
        self.process_connection_changes(events);
        self.process_deals(events);

        self.apply_patches();
        self.refresh_positions();
    }

    fn user_exists(&self, id: UserId) -> bool {
        self.state.silent.contains_key(&id) || self.state.active.contains_key(&id)
    }

    fn drop_rating(&mut self) {
        let RatingState {
            silent,
            active,
            arena,
            leaderboard,
        } = &mut *self.state;

        for (id, slot) in std::mem::take(active) {
            let user = arena.remove(slot);
            silent.insert(
                id,
                SilentUser {
                    second_connected: user.second_connected,
                    name: user.name,
                },
            );
        }

        leaderboard.clear();
        self.ring.clear();
    }

    fn process_registrations(&mut self, events: &mut IngestEvents) {
        for (id, name) in std::mem::take(&mut events.registered) {
            if self.user_exists(id) {
                self.dispatcher
                    .enqueue_error(ProtocolError::MultipleRegistration { id });
                continue;
            }
            self.state.silent.insert(id, SilentUser::named(name));
        }
    }

    fn process_renames(&mut self, events: &mut IngestEvents) {
        let RatingState {
            silent,
            active,
            arena,
            ..
        } = &mut *self.state;

        for (id, name) in std::mem::take(&mut events.renamed) {
            if let Some(&slot) = active.get(&id) {
                arena.get_mut(slot).name = name;
            } else if let Some(user) = silent.get_mut(&id) {
                user.name = name;
            } else {
                self.dispatcher
                    .enqueue_error(ProtocolError::UserUnrecognized { id });
            }
        }
    }

    fn process_connection_changes(&mut self, events: &mut IngestEvents) {
        let RatingState {
            silent,
            active,
            arena,
            ..
        } = &mut *self.state;

        for (id, second) in std::mem::take(&mut events.connection_changes) {
            debug_assert!(second < 60 || second == DISCONNECTED);

            if let Some(&slot) = active.get(&id) {
                let user = arena.get_mut(slot);

                if user.second_connected < 60 {
                    // connected before, drop the old bucket entry
                    self.ring.online[user.second_connected as usize].remove(&slot);
                }

                user.second_connected = second;

                if second < 60 {
                    self.ring.online[second as usize].insert(slot);
                }
            } else if let Some(user) = silent.get_mut(&id) {
                user.second_connected = second;
            } else {
                self.dispatcher
                    .enqueue_error(ProtocolError::UserUnrecognized { id });
            }
        }
    }

    fn process_deals(&mut self, events: &mut IngestEvents) {
        let RatingState {
            silent,
            active,
            arena,
            leaderboard,
        } = &mut *self.state;

        for (id, amount) in std::mem::take(&mut events.deals_won) {
            if let Some(&slot) = active.get(&id) {
                // already rated: plan a removal from the old position and a
                // reinsertion at the one matching the new total
                let board_len = leaderboard.len() as i32;
                let user = arena.get_mut(slot);
                let removal_distance = board_len - user.rating - 1;
                user.winnings += amount;
                let total = user.winnings;

                self.patches.push(RatingPatch {
                    elements_after: removal_distance,
                    kind: PatchKind::Remove,
                    amount: 0,
                    slot: None,
                });
                self.patches.push(RatingPatch {
                    elements_after: elements_after(leaderboard, arena, total),
                    kind: PatchKind::Insert,
                    amount: total,
                    slot: Some(slot),
                });
            } else if let Some(user) = silent.remove(&id) {
                // first win of the week: promote to active
                let second_connected = user.second_connected;
                let slot = arena.insert(ActiveUser {
                    id,
                    winnings: amount,
                    rating: INVALID_RATING,
                    second_connected,
                    name: user.name,
                });

                if second_connected != DISCONNECTED {
                    self.ring.online[second_connected as usize].insert(slot);
                }

                self.fresh_ratings += 1;
                self.patches.push(RatingPatch {
                    elements_after: elements_after(leaderboard, arena, amount),
                    kind: PatchKind::Insert,
                    amount,
                    slot: Some(slot),
                });
                active.insert(id, slot);
            } else {
                self.dispatcher
                    .enqueue_error(ProtocolError::UserUnrecognized { id });
            }
        }
    }

    /// replay the planned patches over the leaderboard in one left-to-right
    /// sweep of block moves.
    ///
    /// `removals_done` counts holes already pulled out of the prefix and
    /// `length_done` the entries already shifted; together they turn each
    /// patch's tail distance into the length of the untouched block between
    /// it and the previous patch.
    fn apply_patches(&mut self) {
        // stable sort keeps push order for fully-equal keys, which is the
        // deterministic id order the deal map iterates in
        self.patches.sort_by(|a, b| {
            a.elements_after
                .cmp(&b.elements_after)
                .then(a.kind.cmp(&b.kind))
                .then(a.amount.cmp(&b.amount))
        });

        let old_len = self.state.leaderboard.len() as i32;
        let mut offset = self.fresh_ratings;

        self.state
            .leaderboard
            .resize((old_len + self.fresh_ratings) as usize, ActiveSlot::PLACEHOLDER);

        let mut removals_done = 0;
        let mut length_done = 0;

        for patch in &self.patches {
            let block_length = patch.elements_after - length_done - removals_done;

            match patch.kind {
                PatchKind::Remove => {
                    removals_done += 1;
                    length_done += block_length;

                    // the hole sits at old_len - 1 - elements_after; the
                    // block of untouched entries starts one past it
                    move_block(
                        &mut self.state.leaderboard,
                        old_len - patch.elements_after,
                        block_length,
                        offset,
                    );
                    offset += 1;
                }
                PatchKind::Insert => {
                    length_done += block_length;
                    let position = old_len - patch.elements_after;

                    move_block(&mut self.state.leaderboard, position, block_length, offset);
                    offset -= 1;
                    self.state.leaderboard[(position + offset) as usize] =
                        patch.slot.expect("insert patch without a user");
                }
            }
        }
    }

    fn refresh_positions(&mut self) {
        let RatingState {
            arena, leaderboard, ..
        } = &mut *self.state;

        for (position, &slot) in leaderboard.iter().enumerate() {
            arena.get_mut(slot).rating = position as i32;
        }
    }
}

/// entries strictly below `winnings`, i.e. the insertion distance from the
/// leaderboard tail. binary search over the winnings-descending board.
fn elements_after(leaderboard: &[ActiveSlot], arena: &ActiveArena, winnings: Monetary) -> i32 {
    let first_smaller =
        leaderboard.partition_point(|&slot| arena.get(slot).winnings >= winnings);
    (leaderboard.len() - first_smaller) as i32
}

fn move_block(board: &mut [ActiveSlot], pos: i32, length: i32, offset: i32) {
    if length <= 0 || offset == 0 {
        return;
    }
    debug_assert!(pos >= 0 && offset > 0);

    let pos = pos as usize;
    let (length, offset) = (length as usize, offset as usize);
    board.copy_within(pos..pos + length, pos + offset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::QueuePack;
    use crate::state::Second;
    use std::collections::HashSet;

    struct Fixture {
        shared: Arc<SharedCore>,
        ingest: Arc<DoubleBuffer>,
        calculator: RatingCalculator,
        pack: QueuePack,
    }

    fn fixture() -> Fixture {
        let shared = Arc::new(SharedCore::new());
        let ingest = Arc::new(DoubleBuffer::new());
        let (dispatcher, mut consumers) = JobDispatcher::new(1);
        let calculator = RatingCalculator::new(
            Arc::clone(&shared),
            Arc::clone(&ingest),
            Arc::new(dispatcher),
        );

        Fixture {
            shared,
            ingest,
            calculator,
            pack: consumers.remove(0),
        }
    }

    impl Fixture {
        fn stage(&self, fill: impl FnOnce(&mut IngestEvents)) {
            let attached = self.ingest.attach();
            // safety: single test thread is the only producer
            fill(unsafe { self.ingest.events_mut(attached) });
            self.ingest.detach(attached);
        }

        fn recalc(&self) {
            self.calculator.recalculate(false);
            self.assert_invariants();
        }

        fn state(&self) -> &RatingState {
            // safety: no concurrent threads in these tests
            unsafe { self.shared.state() }
        }

        fn ring(&self) -> &SecondRing {
            // safety: no concurrent threads in these tests
            unsafe { self.shared.ring() }
        }

        fn board_ids(&self) -> Vec<UserId> {
            let state = self.state();
            state
                .leaderboard
                .iter()
                .map(|&slot| state.arena.get(slot).id)
                .collect()
        }

        fn errors(&mut self) -> Vec<ProtocolError> {
            std::iter::from_fn(|| self.pack.errors.try_pop()).collect()
        }

        fn assert_invariants(&self) {
            let state = self.state();
            let ring = self.ring();

            assert_eq!(state.leaderboard.len(), state.active.len());

            for (position, &slot) in state.leaderboard.iter().enumerate() {
                let user = state.arena.get(slot);
                assert_eq!(user.rating, position as i32, "rating/index mismatch");
                assert!(user.winnings > 0, "active user without winnings");
                if position > 0 {
                    let above = state.arena.get(state.leaderboard[position - 1]);
                    assert!(
                        above.winnings >= user.winnings,
                        "leaderboard not descending at {}",
                        position
                    );
                }
            }

            for (&id, &slot) in &state.active {
                assert_eq!(state.arena.get(slot).id, id);
                assert!(!state.silent.contains_key(&id));
            }

            let online: usize = ring.online.iter().map(HashSet::len).sum();
            let connected = state
                .active
                .values()
                .filter(|&&slot| state.arena.get(slot).second_connected < 60)
                .count();
            assert_eq!(online, connected, "ring out of sync with connections");
        }
    }

    fn register(events: &mut IngestEvents, id: UserId, name: &[u8]) {
        events.registered.insert(id, name.to_vec());
    }

    fn connect(events: &mut IngestEvents, id: UserId, second: Second) {
        events.connection_changes.insert(id, second);
    }

    #[test]
    fn test_registration_creates_silent_user() {
        let fx = fixture();
        fx.stage(|e| register(e, 7, b"alice"));
        fx.recalc();

        let state = fx.state();
        assert_eq!(state.silent[&7].name, b"alice");
        assert!(state.active.is_empty());
        assert!(state.leaderboard.is_empty());
    }

    #[test]
    fn test_multiple_registration_reported() {
        let mut fx = fixture();
        fx.stage(|e| register(e, 5, b"a"));
        fx.recalc();
        fx.stage(|e| register(e, 5, b"b"));
        fx.recalc();

        assert_eq!(fx.errors(), vec![ProtocolError::MultipleRegistration { id: 5 }]);
        // the first registration's name survives the rejected one
        assert_eq!(fx.state().silent[&5].name, b"a");
    }

    #[test]
    fn test_rename_silent_and_active() {
        let mut fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"one");
            register(e, 2, b"two");
        });
        fx.recalc();
        fx.stage(|e| e.stage_deal(2, 100));
        fx.recalc();

        fx.stage(|e| {
            e.renamed.insert(1, b"uno".to_vec());
            e.renamed.insert(2, b"dos".to_vec());
            e.renamed.insert(99, b"ghost".to_vec());
        });
        fx.recalc();

        let errors = fx.errors();
        assert_eq!(errors, vec![ProtocolError::UserUnrecognized { id: 99 }]);

        let state = fx.state();
        assert_eq!(state.silent[&1].name, b"uno");
        let slot = state.active[&2];
        assert_eq!(state.arena.get(slot).name, b"dos");
    }

    #[test]
    fn test_single_user_lifecycle() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 7, b"alice");
            connect(e, 7, 3);
            e.stage_deal(7, 100);
        });
        fx.recalc();

        let state = fx.state();
        assert_eq!(fx.board_ids(), vec![7]);
        let slot = state.active[&7];
        let user = state.arena.get(slot);
        assert_eq!(user.winnings, 100);
        assert_eq!(user.rating, 0);
        assert_eq!(user.second_connected, 3);
        assert!(fx.ring().online[3].contains(&slot));
    }

    #[test]
    fn test_promotion_emits_no_error() {
        let mut fx = fixture();
        fx.stage(|e| register(e, 1, b""));
        fx.recalc();
        fx.stage(|e| e.stage_deal(1, 50));
        fx.recalc();

        assert!(fx.errors().is_empty());
    }

    #[test]
    fn test_deal_for_unknown_user_reported() {
        let mut fx = fixture();
        fx.stage(|e| e.stage_deal(999, 10));
        fx.recalc();

        assert_eq!(fx.errors(), vec![ProtocolError::UserUnrecognized { id: 999 }]);
        assert!(fx.state().leaderboard.is_empty());
    }

    #[test]
    fn test_connection_change_for_unknown_user_reported() {
        let mut fx = fixture();
        fx.stage(|e| connect(e, 42, 10));
        fx.recalc();

        assert_eq!(fx.errors(), vec![ProtocolError::UserUnrecognized { id: 42 }]);
    }

    #[test]
    fn test_reconnect_moves_ring_bucket() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"");
            connect(e, 1, 10);
            e.stage_deal(1, 100);
        });
        fx.recalc();

        fx.stage(|e| connect(e, 1, 42));
        fx.recalc();

        let slot = fx.state().active[&1];
        assert!(!fx.ring().online[10].contains(&slot));
        assert!(fx.ring().online[42].contains(&slot));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"");
            connect(e, 1, 10);
            e.stage_deal(1, 100);
        });
        fx.recalc();

        for _ in 0..2 {
            fx.stage(|e| connect(e, 1, DISCONNECTED));
            fx.recalc();
        }

        let state = fx.state();
        let slot = state.active[&1];
        assert_eq!(state.arena.get(slot).second_connected, DISCONNECTED);
        assert!(fx.ring().online.iter().all(HashSet::is_empty));
    }

    #[test]
    fn test_position_shift_on_overtake() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"A");
            register(e, 2, b"B");
        });
        fx.recalc();
        fx.stage(|e| {
            e.stage_deal(1, 100);
            e.stage_deal(2, 50);
        });
        fx.recalc();
        assert_eq!(fx.board_ids(), vec![1, 2]);

        fx.stage(|e| e.stage_deal(2, 200));
        fx.recalc();

        assert_eq!(fx.board_ids(), vec![2, 1]);
        let state = fx.state();
        assert_eq!(state.arena.get(state.active[&2]).winnings, 250);
        assert_eq!(state.arena.get(state.active[&2]).rating, 0);
        assert_eq!(state.arena.get(state.active[&1]).rating, 1);
    }

    #[test]
    fn test_stationary_user_keeps_position() {
        let fx = fixture();
        fx.stage(|e| register(e, 1, b""));
        fx.recalc();
        fx.stage(|e| e.stage_deal(1, 100));
        fx.recalc();

        // winning again with nobody to overtake produces an equal-distance
        // remove/insert pair; the user must stay put
        fx.stage(|e| e.stage_deal(1, 50));
        fx.recalc();

        assert_eq!(fx.board_ids(), vec![1]);
        let state = fx.state();
        assert_eq!(state.arena.get(state.active[&1]).winnings, 150);
    }

    #[test]
    fn test_fresh_user_lands_between_existing() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"A");
            register(e, 2, b"B");
            register(e, 3, b"F");
        });
        fx.recalc();
        fx.stage(|e| {
            e.stage_deal(1, 100);
            e.stage_deal(2, 50);
        });
        fx.recalc();

        fx.stage(|e| e.stage_deal(3, 75));
        fx.recalc();

        assert_eq!(fx.board_ids(), vec![1, 3, 2]);
    }

    #[test]
    fn test_simultaneous_promotions_order_by_amount() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"");
            register(e, 2, b"");
            register(e, 3, b"");
        });
        fx.recalc();

        fx.stage(|e| {
            e.stage_deal(1, 30);
            e.stage_deal(2, 90);
            e.stage_deal(3, 60);
        });
        fx.recalc();

        assert_eq!(fx.board_ids(), vec![2, 3, 1]);
    }

    #[test]
    fn test_crossing_updates_in_one_minute() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"A");
            register(e, 2, b"B");
            register(e, 3, b"C");
        });
        fx.recalc();
        fx.stage(|e| {
            e.stage_deal(1, 100);
            e.stage_deal(2, 90);
            e.stage_deal(3, 80);
        });
        fx.recalc();
        assert_eq!(fx.board_ids(), vec![1, 2, 3]);

        // B nudges up, C vaults to the top, all within one fold
        fx.stage(|e| {
            e.stage_deal(2, 5);
            e.stage_deal(3, 30);
        });
        fx.recalc();

        assert_eq!(fx.board_ids(), vec![3, 1, 2]);
    }

    #[test]
    fn test_deal_order_within_minute_is_irrelevant() {
        // the same deals staged in different arrival order sum identically
        let fx_a = fixture();
        let fx_b = fixture();

        for fx in [&fx_a, &fx_b] {
            fx.stage(|e| {
                register(e, 1, b"");
                register(e, 2, b"");
            });
            fx.recalc();
        }

        fx_a.stage(|e| {
            e.stage_deal(1, 10);
            e.stage_deal(2, 70);
            e.stage_deal(1, 60);
        });
        fx_b.stage(|e| {
            e.stage_deal(1, 60);
            e.stage_deal(1, 10);
            e.stage_deal(2, 70);
        });

        fx_a.recalc();
        fx_b.recalc();

        assert_eq!(fx_a.board_ids(), fx_b.board_ids());
        assert_eq!(fx_a.board_ids(), vec![2, 1]);
    }

    #[test]
    fn test_many_users_over_multiple_rounds() {
        let fx = fixture();

        fx.stage(|e| {
            for id in 0..25 {
                register(e, id, format!("user-{id}").as_bytes());
                connect(e, id, (id % 60) as Second);
            }
        });
        fx.recalc();

        // round 1: distinct amounts, reverse of id order
        fx.stage(|e| {
            for id in 0..25 {
                e.stage_deal(id, (100 - id as i64) * 10);
            }
        });
        fx.recalc();
        assert_eq!(fx.board_ids(), (0..25).collect::<Vec<_>>());

        // round 2: a spread of boosts that reshuffles the field
        fx.stage(|e| {
            for id in (0..25).step_by(2) {
                e.stage_deal(id, id as i64 * 95);
            }
        });
        fx.recalc();

        // compare against a reference sort of the final totals
        let state = fx.state();
        let mut expected: Vec<(Monetary, UserId)> = state
            .active
            .iter()
            .map(|(&id, &slot)| (state.arena.get(slot).winnings, id))
            .collect();
        expected.sort_by(|a, b| b.0.cmp(&a.0));
        let expected_ids: Vec<UserId> = expected.into_iter().map(|(_, id)| id).collect();

        assert_eq!(fx.board_ids(), expected_ids);
    }

    #[test]
    fn test_week_drop_resets_to_silent() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"alice");
            register(e, 2, b"bob");
            connect(e, 1, 5);
        });
        fx.recalc();
        fx.stage(|e| {
            e.stage_deal(1, 100);
            e.stage_deal(2, 200);
        });
        fx.recalc();
        assert_eq!(fx.state().active.len(), 2);

        fx.calculator.recalculate(true);

        let state = fx.state();
        assert!(state.active.is_empty());
        assert!(state.leaderboard.is_empty());
        assert!(fx.ring().online.iter().all(HashSet::is_empty));
        // names and connection state survive the reset, winnings do not
        assert_eq!(state.silent[&1].name, b"alice");
        assert_eq!(state.silent[&1].second_connected, 5);
        assert_eq!(state.silent[&2].name, b"bob");
    }

    #[test]
    fn test_active_again_after_week_drop() {
        let fx = fixture();
        fx.stage(|e| {
            register(e, 1, b"");
            connect(e, 1, 30);
        });
        fx.recalc();
        fx.stage(|e| e.stage_deal(1, 500));
        fx.recalc();

        fx.calculator.recalculate(true);

        fx.stage(|e| e.stage_deal(1, 10));
        fx.recalc();

        let state = fx.state();
        let slot = state.active[&1];
        assert_eq!(state.arena.get(slot).winnings, 10);
        // still connected at the pre-reset second
        assert!(fx.ring().online[30].contains(&slot));
    }

    #[test]
    fn test_recalculate_waits_for_parked_readers() {
        use std::thread;
        use std::time::{Duration, Instant};

        let fx = fixture();
        fx.shared.sync.reader_count.store(1, Ordering::Release);

        let shared = Arc::clone(&fx.shared);
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            shared.sync.reader_count.fetch_sub(1, Ordering::Release);
        });

        let started = Instant::now();
        fx.calculator.recalculate(false);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!fx.shared.sync.refresh_in_progress.load(Ordering::Relaxed));

        reader.join().unwrap();
    }
}
