//! wall-clock arithmetic for the weekly rating cycle.
//!
//! everything is raw seconds-since-epoch math on purpose: the service only
//! needs week boundaries, the second-of-minute bucket index and full-second
//! alignment, none of which justify a calendar library.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECS_PER_DAY: i64 = 86_400;

/// the unix epoch fell on a thursday; monday week starts sit 4 days off
const EPOCH_TO_FIRST_MONDAY_DAYS: i64 = 4;

fn epoch_secs(now: SystemTime) -> i64 {
    now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// start of the week (monday 00:00 UTC) containing `now`.
///
/// instants before the first post-epoch monday clamp to the epoch; the
/// service never sees them, but the math should not underflow either.
pub fn week_start_of(now: SystemTime) -> SystemTime {
    let days = epoch_secs(now).div_euclid(SECS_PER_DAY);
    let monday_days = (days - EPOCH_TO_FIRST_MONDAY_DAYS).div_euclid(7) * 7
        + EPOCH_TO_FIRST_MONDAY_DAYS;

    UNIX_EPOCH + Duration::from_secs((monday_days * SECS_PER_DAY).max(0) as u64)
}

pub fn current_week_start() -> SystemTime {
    week_start_of(SystemTime::now())
}

/// bucket index of `now` within its minute, in `[0, 59]`.
pub fn second_of_minute_of(now: SystemTime) -> u8 {
    (epoch_secs(now).rem_euclid(60)) as u8
}

pub fn second_of_minute() -> u8 {
    second_of_minute_of(SystemTime::now())
}

/// sleep until the next full wall-clock second.
///
/// aligns the announcer's steady ticker with the system clock; a thread
/// already sitting on a second boundary does not sleep.
pub fn sleep_until_next_full_second() {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let nanos = now.subsec_nanos();
    if nanos > 0 {
        thread::sleep(Duration::new(0, 1_000_000_000 - nanos));
    }
}
