//! top-level session loop and fault policy.
//!
//! the supervisor owns the canonical rating data for the lifetime of the
//! process. everything else - transport session, ingest double buffer, job
//! dispatcher, announcer, worker pool - is per-session infrastructure,
//! rebuilt from scratch after a recoverable fault while the rating data
//! survives. a fatal fault terminates the service.

use crate::announcer::Announcer;
use crate::calculator::RatingCalculator;
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::ingest::DoubleBuffer;
use crate::jobs::JobDispatcher;
use crate::router::MessageRouter;
use crate::state::SharedCore;
use crate::transport::{FrameReader, Listener};
use log::{error, info};
use podium_proto::ClientMessage;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct Supervisor {
    shared: Arc<SharedCore>,
    config: Arc<ServiceConfig>,
}

impl Supervisor {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate().map_err(ServiceError::Config)?;

        Ok(Self {
            shared: Arc::new(SharedCore::new()),
            config: Arc::new(config),
        })
    }

    /// bind the configured address and serve forever.
    ///
    /// returns only on a fatal fault (the error) or when binding fails.
    pub fn run(&self) -> Result<()> {
        let listener = Listener::bind(self.config.bind_addr)?;
        info!("listening on {}", listener.local_addr()?);
        self.serve(listener)
    }

    /// serve sessions from an already bound listener.
    pub fn serve(&self, listener: Listener) -> Result<()> {
        loop {
            match self.run_session(&listener) {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => error!("session fault: {}", e),
                Err(e) => {
                    error!("unrecoverable fault: {}", e);
                    return Err(e);
                }
            }

            if self.shared.sync.stop.is_fatal() {
                error!("can't recover, terminating the service");
                return Ok(());
            }

            info!("attempting recovery...");
        }
    }

    /// serve exactly one client session: accept, spin up the pipeline, run
    /// the ingest loop inline, tear everything down.
    fn run_session(&self, listener: &Listener) -> Result<()> {
        self.shared.sync.stop.reset_recoverable();

        // no session threads exist yet, so a handshake failure needs no
        // teardown beyond dropping the connection
        let (mut reader, writer) = listener.accept_session()?;
        info!("client session established");

        let ingest = Arc::new(DoubleBuffer::new());
        let (dispatcher, consumers) = JobDispatcher::new(self.config.worker_concurrency);
        let dispatcher = Arc::new(dispatcher);

        // claim the current ingest buffer before anything can flip it
        let mut attached = ingest.attach();

        let calculator = RatingCalculator::new(
            Arc::clone(&self.shared),
            Arc::clone(&ingest),
            Arc::clone(&dispatcher),
        );
        let announcer = Announcer::new(
            Arc::clone(&self.shared),
            Arc::clone(&dispatcher),
            calculator,
        )
        .start();
        let workers = crate::worker::WorkerPool::start(
            Arc::clone(&self.shared),
            writer,
            Arc::clone(&self.config),
            consumers,
        );

        let result = self.ingest_loop(&mut reader, &ingest, &mut attached, &dispatcher);

        match &result {
            Ok(()) => self.shared.sync.stop.signal_recoverable(),
            Err(e) if e.is_recoverable() => self.shared.sync.stop.signal_recoverable(),
            Err(_) => self.shared.sync.stop.signal_fatal(),
        }

        // releasing the attachment also unblocks a calculator mid-flip
        ingest.detach(attached);

        join_all("announcer", std::iter::once(announcer), &self.shared);
        join_all("worker", workers, &self.shared);
        info!("session torn down");

        result
    }

    /// the router's receive loop; runs on the supervisor thread.
    fn ingest_loop(
        &self,
        reader: &mut FrameReader,
        ingest: &DoubleBuffer,
        attached: &mut usize,
        dispatcher: &Arc<JobDispatcher>,
    ) -> Result<()> {
        let router = MessageRouter::new(Arc::clone(dispatcher));

        while !self.shared.sync.stop.is_stopped() {
            let payload = reader.read_frame()?;
            let msg = ClientMessage::decode(payload)?;

            // follow a buffer flip before staging anything
            *attached = ingest.reattach(*attached);
            // safety: this thread is attached and is the only producer
            let events = unsafe { ingest.events_mut(*attached) };

            router.route(msg, events)?;
        }

        Ok(())
    }
}

fn join_all(
    name: &str,
    handles: impl IntoIterator<Item = JoinHandle<()>>,
    shared: &Arc<SharedCore>,
) {
    for handle in handles {
        if handle.join().is_err() {
            error!("{} thread panicked", name);
            shared.sync.stop.signal_fatal();
        }
    }
}
