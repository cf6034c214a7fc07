//! per-second announcement scheduling and the minutely recalculation tick.
//!
//! the announcer thread drives the whole serving cadence: it invokes the
//! calculator at minute boundaries and, each second, enqueues one rating
//! job for every user whose connection second matches.
//!
//! the rating served during a minute is the one frozen at its start, so a
//! week turnover is handled with a deliberate one-minute lag: the minute
//! after the wall clock crosses into a new week still serves the old
//! leaderboard (it is the freeze of the old week's last minute), and only
//! the next recalculation drops it. resist the urge to reset immediately -
//! that would serve a leaderboard the backing data no longer matches.

use crate::calculator::RatingCalculator;
use crate::clock;
use crate::jobs::JobDispatcher;
use crate::state::{SharedCore, SECONDS_PER_MINUTE};
use log::info;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct Announcer {
    shared: Arc<SharedCore>,
    dispatcher: Arc<JobDispatcher>,
    calculator: RatingCalculator,
}

impl Announcer {
    pub fn new(
        shared: Arc<SharedCore>,
        dispatcher: Arc<JobDispatcher>,
        calculator: RatingCalculator,
    ) -> Self {
        Self {
            shared,
            dispatcher,
            calculator,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self) {
        let mut drop_old_rating = false;
        let mut second_index;

        {
            let current_week = clock::current_week_start();

            // safety: week bookkeeping belongs to this thread alone
            match unsafe { self.shared.week_start() } {
                None => unsafe { self.shared.set_week_start(current_week) },
                Some(served) if served != current_week => {
                    // the service was down across a week boundary
                    drop_old_rating = true;
                }
                Some(_) => {}
            }

            clock::sleep_until_next_full_second();
            second_index = clock::second_of_minute() as usize;
        }

        info!("announcer started at second {}", second_index);

        let mut week_just_turned = false;
        let mut interval_start = Instant::now();

        loop {
            self.calculator.recalculate(drop_old_rating);

            if drop_old_rating {
                drop_old_rating = false;
                // safety: announcer thread only
                unsafe {
                    self.shared.set_week_start(clock::current_week_start());
                }
                info!("week rolled over, leaderboard reset");
            }

            while second_index < SECONDS_PER_MINUTE && !self.shared.sync.stop.is_stopped() {
                self.announce(second_index);

                interval_start += Duration::from_secs(1);
                let now = Instant::now();
                if now < interval_start {
                    thread::sleep(interval_start - now);
                }

                second_index += 1;
            }

            if second_index != SECONDS_PER_MINUTE {
                // stop signal observed mid-minute
                return;
            }

            if week_just_turned {
                // the lag minute has been served; reset on the next
                // recalculation and re-align the steady ticker, accepting
                // that the first minute of a week may serve only part of
                // the schedule
                drop_old_rating = true;
                week_just_turned = false;

                clock::sleep_until_next_full_second();
                second_index = clock::second_of_minute() as usize;
                interval_start = Instant::now();
                continue;
            }

            // safety: announcer thread only
            let served_week = unsafe { self.shared.week_start() };
            if served_week.is_some_and(|served| clock::current_week_start() > served) {
                week_just_turned = true;
            }

            second_index = 0;
        }
    }

    /// schedule one rating job per user connected at this second.
    fn announce(&self, second_index: usize) {
        // safety: the ring is only mutated by the calculator, which runs on
        // this thread; workers never touch it
        let ring = unsafe { self.shared.ring() };

        for &slot in &ring.online[second_index] {
            self.dispatcher.enqueue_user_data(slot);
        }
    }
}
