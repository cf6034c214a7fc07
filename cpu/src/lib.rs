// podium-cpu

mod affinity;
mod cache_padded;
pub mod fence;
mod spinlock;

pub use {
    affinity::{cpu_count, set_cpu_affinity, AffinityError},
    cache_padded::{CachePadded, CACHE_LINE_SIZE},
    fence::{cpu_pause, fence_acquire, fence_release},
    spinlock::{Spinlock, SpinlockGuard},
};
