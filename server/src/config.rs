use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// configuration for the rating service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// address the listener binds to.
    pub bind_addr: SocketAddr,

    /// number of worker threads serializing outgoing packets.
    pub worker_concurrency: usize,

    /// CPU cores to pin workers to, one per worker. empty disables pinning.
    pub worker_cores: Vec<usize>,

    /// how long an idle worker sleeps when a full pass finds no jobs.
    pub idle_wait: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            worker_concurrency: 2,
            worker_cores: Vec::new(),
            idle_wait: Duration::from_millis(10),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// set the worker pool size.
    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers;
        self
    }

    /// pin workers to the given cores (one core per worker).
    pub fn with_worker_cores(mut self, cores: Vec<usize>) -> Self {
        self.worker_cores = cores;
        self
    }

    /// set the idle sleep for workers with nothing to do.
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker_concurrency == 0 {
            return Err("worker concurrency must be at least 1".to_string());
        }

        if !self.worker_cores.is_empty() && self.worker_cores.len() != self.worker_concurrency {
            return Err(format!(
                "worker core list has {} entries for {} workers",
                self.worker_cores.len(),
                self.worker_concurrency
            ));
        }

        Ok(())
    }
}
