// thread cpu affinity
//
// pinning the hot threads to dedicated cores keeps their working set in
// the local cache and takes the scheduler out of the latency picture

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AffinityError {
    #[error("cpu {cpu} out of range (max {max})")]
    InvalidCpu { cpu: usize, max: usize },

    #[error("empty cpu list")]
    EmptyCpuList,

    #[error("cpu affinity not supported on this platform")]
    NotSupported,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// fixed glibc limit for CPU_SET
#[cfg(target_os = "linux")]
const CPU_SETSIZE: usize = 1024;

/// pin the calling thread to the given cpus.
#[cfg(target_os = "linux")]
pub fn set_cpu_affinity(cpus: impl IntoIterator<Item = usize>) -> Result<(), AffinityError> {
    // safety: cpu_set_t is a pod type, zero is its empty state
    let mut cpu_set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let max = cpu_count()?.saturating_sub(1);
    let mut has_cpus = false;

    for cpu in cpus {
        if cpu > max || cpu >= CPU_SETSIZE {
            return Err(AffinityError::InvalidCpu {
                cpu,
                max: max.min(CPU_SETSIZE - 1),
            });
        }

        // safety: cpu validated against CPU_SETSIZE above
        unsafe {
            libc::CPU_SET(cpu, &mut cpu_set);
        }
        has_cpus = true;
    }

    if !has_cpus {
        return Err(AffinityError::EmptyCpuList);
    }

    // safety: pid 0 means the calling thread, set and size are valid
    let result = unsafe {
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpu_set)
    };

    if result != 0 {
        return Err(AffinityError::Io(io::Error::last_os_error()));
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_cpu_affinity(_cpus: impl IntoIterator<Item = usize>) -> Result<(), AffinityError> {
    Err(AffinityError::NotSupported)
}

/// number of online logical cpus.
pub fn cpu_count() -> Result<usize, AffinityError> {
    // safety: sysconf is always safe to call
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };

    if count <= 0 {
        return Err(AffinityError::Io(io::Error::last_os_error()));
    }

    Ok(count as usize)
}
