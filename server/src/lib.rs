//! real-time weekly user-ranking service.
//!
//! ingests a stream of user-lifecycle and deal-outcome events over a
//! single TCP session, maintains a weekly leaderboard keyed by accumulated
//! winnings and pushes a personalized rating slice to every connected user
//! once per second. the leaderboard is rebuilt once per minute; between
//! rebuilds workers stream packets cut from a frozen snapshot.
//!
//! # architecture
//!
//! dedicated threads, no async runtime:
//!
//! - **router** (the supervisor thread): reads frames, decodes them and
//!   stages events into the current ingest buffer of a double buffer
//! - **announcer**: once a minute flips the double buffer and folds the
//!   drained events into the leaderboard (the calculator); once a second
//!   schedules rating jobs for the users connected at that second
//! - **workers** (default 2): drain their job queues and serialize rating
//!   and error packets onto the shared transport behind a write spinlock
//!
//! correctness rests on the barrier between the ingest phase and the serve
//! phase of every minute: the calculator waits for the old buffer's writer
//! count and the worker reader count to both reach zero before mutating
//! anything, and hands the data back over a condvar.
//!
//! # example
//!
//! ```no_run
//! use podium_server::{ServiceConfig, Supervisor};
//!
//! let config = ServiceConfig::new()
//!     .with_bind_addr("0.0.0.0:4040".parse().unwrap())
//!     .with_worker_concurrency(2);
//!
//! let supervisor = Supervisor::new(config).unwrap();
//! supervisor.run().unwrap();
//! ```

mod announcer;
mod calculator;
mod clock;
mod config;
mod error;
mod ingest;
mod jobs;
mod router;
mod state;
mod supervisor;
mod transport;
mod worker;

pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use supervisor::Supervisor;
pub use transport::Listener;
