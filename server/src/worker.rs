//! worker pool serializing rating and error packets onto the transport.
//!
//! each worker owns one queue pack and two persistent output frames whose
//! `(length, opcode)` prefixes are written once. the rating frame also
//! carries a cached copy of the top-ten leaderboard, rebuilt once per
//! refresh cycle, so a typical rating packet only appends the subject's
//! competition window and rewrites the twelve header bytes.
//!
//! during a refresh a worker drains its user-data jobs (they reference the
//! snapshot the calculator has not started mutating yet), surrenders its
//! reader slot and parks on the condvar until the data is handed back.

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::jobs::{QueuePack, UserIdJob};
use crate::state::{RatingState, SharedCore, SyncBlock};
use crate::transport::{new_error_frame, new_rating_frame, FrameWriter};
use log::{error, info, warn};
use podium_cpu::set_cpu_affinity;
use podium_proto::{
    competition_window, ByteWriter, ProtocolError, RatingEntry, RatingPack, UserId,
    INVALID_USER_ID, TOP_POSITIONS,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct WorkerPool;

impl WorkerPool {
    /// spawn one worker per queue pack.
    pub fn start(
        shared: Arc<SharedCore>,
        writer: Arc<FrameWriter>,
        config: Arc<ServiceConfig>,
        consumers: Vec<QueuePack>,
    ) -> Vec<JoinHandle<()>> {
        consumers
            .into_iter()
            .enumerate()
            .map(|(index, pack)| {
                let shared = Arc::clone(&shared);
                let writer = Arc::clone(&writer);
                let config = Arc::clone(&config);
                thread::spawn(move || run_worker(index, shared, writer, config, pack))
            })
            .collect()
    }
}

fn run_worker(
    index: usize,
    shared: Arc<SharedCore>,
    writer: Arc<FrameWriter>,
    config: Arc<ServiceConfig>,
    mut pack: QueuePack,
) {
    if let Some(&core) = config.worker_cores.get(index) {
        match set_cpu_affinity([core]) {
            Ok(()) => info!("worker {} pinned to cpu {}", index, core),
            Err(e) => warn!("worker {}: failed to pin to cpu {}: {}", index, core, e),
        }
    }

    register_reader(&shared.sync);
    let result = serve(&shared, &writer, &config, &mut pack);
    deregister_reader(&shared.sync);

    match result {
        Ok(()) => info!("worker {} stopped", index),
        Err(e) if e.is_recoverable() => {
            warn!("worker {}: session fault: {}", index, e);
            shared.sync.stop.signal_recoverable();
        }
        Err(e) => {
            error!("worker {}: {}", index, e);
            shared.sync.stop.signal_fatal();
        }
    }
}

/// rating output frame plus the positions bounding its cached prefix.
struct RatingFrame {
    frame: ByteWriter,
    /// start of the pack header, right after the frame prefix.
    base: usize,
    /// end of the cached top-ratings block.
    top_end: usize,
}

impl RatingFrame {
    fn new() -> Self {
        let frame = new_rating_frame();
        let base = frame.position();
        Self {
            frame,
            base,
            top_end: base,
        }
    }
}

fn serve(
    shared: &SharedCore,
    writer: &FrameWriter,
    config: &ServiceConfig,
    pack: &mut QueuePack,
) -> Result<()> {
    let mut rating = RatingFrame::new();
    let mut error_frame = new_error_frame();
    let error_base = error_frame.position();

    cache_top_ratings(shared, &mut rating)?;

    loop {
        if shared.sync.stop.is_stopped() {
            return Ok(());
        }

        if shared.sync.refresh_in_progress.load(Ordering::Relaxed) {
            // these jobs still reference the snapshot being retired; they
            // must go out before the reader slot is surrendered
            drain_user_data(shared, writer, &mut rating, pack)?;
            park_for_refresh(&shared.sync);
            cache_top_ratings(shared, &mut rating)?;
        }

        let mut worked = false;

        while let Some(err) = pack.errors.try_pop() {
            send_error(writer, &mut error_frame, error_base, &err)?;
            worked = true;
        }

        while let Some(job) = pack.user_ids.try_pop() {
            process_user_id(
                shared,
                writer,
                &mut rating,
                &mut error_frame,
                error_base,
                job,
            )?;
            worked = true;
        }

        worked |= drain_user_data(shared, writer, &mut rating, pack)?;

        if !worked {
            thread::sleep(config.idle_wait);
        }
    }
}

fn process_user_id(
    shared: &SharedCore,
    writer: &FrameWriter,
    rating: &mut RatingFrame,
    error_frame: &mut ByteWriter,
    error_base: usize,
    job: UserIdJob,
) -> Result<()> {
    // safety: this worker holds a reader slot
    let state = unsafe { shared.state() };

    if let Some(&slot) = state.active.get(&job.id) {
        let user = state.arena.get(slot);
        send_rating(writer, rating, state, user.id, user.rating)
    } else if state.silent.contains_key(&job.id) || job.promised {
        // known but unrated: one past the end of the leaderboard
        send_rating(writer, rating, state, job.id, state.leaderboard.len() as i32)
    } else {
        // the id was never registered, or the job raced a week reset
        send_error(
            writer,
            error_frame,
            error_base,
            &ProtocolError::UserUnrecognized { id: job.id },
        )
    }
}

fn drain_user_data(
    shared: &SharedCore,
    writer: &FrameWriter,
    rating: &mut RatingFrame,
    pack: &mut QueuePack,
) -> Result<bool> {
    let mut worked = false;

    while let Some(slot) = pack.user_data.try_pop() {
        // safety: reader slot held; user-data jobs never cross a refresh,
        // so the slot belongs to the snapshot being served
        let state = unsafe { shared.state() };
        let user = state.arena.get(slot);
        send_rating(writer, rating, state, user.id, user.rating)?;
        worked = true;
    }

    Ok(worked)
}

/// rebuild the cached `(placeholder header, top ten)` prefix.
fn cache_top_ratings(shared: &SharedCore, rating: &mut RatingFrame) -> Result<()> {
    // safety: this worker holds a reader slot
    let state = unsafe { shared.state() };

    rating.frame.truncate(rating.base);
    RatingPack::write_header(&mut rating.frame, INVALID_USER_ID, 0, 0);

    let top = (TOP_POSITIONS as usize).min(state.leaderboard.len());
    for &slot in &state.leaderboard[..top] {
        let user = state.arena.get(slot);
        RatingEntry::write(&mut rating.frame, user.id, user.winnings, &user.name)?;
    }

    rating.top_end = rating.frame.position();
    Ok(())
}

fn send_rating(
    writer: &FrameWriter,
    rating: &mut RatingFrame,
    state: &RatingState,
    subject: UserId,
    position: i32,
) -> Result<()> {
    debug_assert_eq!(rating.frame.position(), rating.top_end);

    let length = state.leaderboard.len() as i32;
    debug_assert!(position <= length);

    let (begin, end) = competition_window(length, position);
    for index in begin..end {
        let user = state.arena.get(state.leaderboard[index as usize]);
        RatingEntry::write(&mut rating.frame, user.id, user.winnings, &user.name)?;
    }

    rating.frame.set_position(rating.base);
    RatingPack::write_header(&mut rating.frame, subject, length, position);

    writer.send(&mut rating.frame).map_err(ServiceError::Io)?;

    // back to the cached-prefix state for the next message
    rating.frame.truncate(rating.top_end);
    Ok(())
}

fn send_error(
    writer: &FrameWriter,
    frame: &mut ByteWriter,
    base: usize,
    error: &ProtocolError,
) -> Result<()> {
    error.encode(frame);
    writer.send(frame).map_err(ServiceError::Io)?;
    frame.truncate(base);
    Ok(())
}

/// claim a reader slot, waiting out any refresh already in progress.
fn register_reader(sync: &SyncBlock) {
    let mut guard = sync
        .data_lock
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    while sync.refresh_in_progress.load(Ordering::Acquire) {
        guard = sync
            .data_refreshed
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
    sync.reader_count.fetch_add(1, Ordering::AcqRel);
}

fn deregister_reader(sync: &SyncBlock) {
    sync.reader_count.fetch_sub(1, Ordering::Release);
}

/// hand the reader slot to the calculator and take it back once the
/// refresh completes.
fn park_for_refresh(sync: &SyncBlock) {
    let mut guard = sync
        .data_lock
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    sync.reader_count.fetch_sub(1, Ordering::Release);

    while sync.refresh_in_progress.load(Ordering::Acquire) {
        guard = sync
            .data_refreshed
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    sync.reader_count.fetch_add(1, Ordering::AcqRel);
}
