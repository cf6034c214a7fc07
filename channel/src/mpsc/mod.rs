//! multi producer single consumer (MPSC) channel.
//!
//! a non-intrusive vyukov queue: each push allocates a node, swings the
//! shared tail over it with a single `AcqRel` exchange and release-links it
//! from its predecessor. the consumer follows `next` pointers with acquire
//! loads and frees each node strictly after moving its value out, so node
//! memory is never reused while a producer can still reach it (no ABA).
//!
//! # guarantees
//!
//! - `push` is wait-free apart from the allocator and never fails
//! - `try_pop` is single-consumer, non-blocking
//! - events from one producer arrive in the order they were pushed
//!
//! # example
//!
//! ```
//! use podium_channel::mpsc;
//! use std::thread;
//!
//! let (tx, mut rx) = mpsc::channel::<u64>();
//!
//! let tx2 = tx.clone();
//! let handle = thread::spawn(move || {
//!     for i in 0..100 {
//!         tx2.push(i);
//!     }
//! });
//!
//! handle.join().unwrap();
//! drop(tx);
//!
//! let mut received = 0;
//! while rx.try_pop().is_some() {
//!     received += 1;
//! }
//! assert_eq!(received, 100);
//! ```

mod consumer;
mod producer;
mod queue;

pub use consumer::Consumer;
pub use producer::Producer;

use queue::Shared;
use std::sync::Arc;

/// create a new unbounded MPSC channel.
pub fn channel<T>() -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared::new());

    let producer = Producer {
        shared: Arc::clone(&shared),
    };
    let consumer = Consumer { shared };

    (producer, consumer)
}
