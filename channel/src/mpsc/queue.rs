//! vyukov queue internals shared by the producer and consumer handles.
//!
//! the queue always contains one "stub" node whose value has already been
//! taken; `head` points at it. a push exchanges `tail` to the new node and
//! then links the predecessor's `next` to it, so the list is complete
//! except for a transient window between the exchange and the link. the
//! consumer simply stops at a null `next` and retries later - it never
//! observes a torn node.

use podium_cpu::CachePadded;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: Option<T>,
}

impl<T> Node<T> {
    fn boxed(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

pub(super) struct Shared<T> {
    /// producers swing this with an acq_rel exchange to claim the slot
    /// after the current tail.
    tail: CachePadded<AtomicPtr<Node<T>>>,
    /// consumer-owned; always points at the current stub node. stored and
    /// loaded relaxed - only the single consumer ever touches it.
    head: CachePadded<AtomicPtr<Node<T>>>,
    /// live producer handles; the consumer reports disconnection at zero.
    pub(super) producer_count: CachePadded<AtomicUsize>,
}

impl<T> Shared<T> {
    pub(super) fn new() -> Self {
        let stub = Node::boxed(None);
        Self {
            tail: CachePadded::new(AtomicPtr::new(stub)),
            head: CachePadded::new(AtomicPtr::new(stub)),
            producer_count: CachePadded::new(AtomicUsize::new(1)),
        }
    }

    /// link a new node at the tail. callable from any thread, never blocks.
    pub(super) fn push(&self, value: T) {
        let node = Node::boxed(Some(value));

        // the release store of `next` publishes the node body; the consumer
        // pairs with it through its acquire load of `next`
        let prev = self.tail.swap(node, Ordering::AcqRel);
        // safety: `prev` is a node we or another producer published, and
        // nodes are freed only after the consumer moves past them - which
        // it cannot do before this store makes them reachable
        unsafe {
            (*prev).next.store(node, Ordering::Release);
        }
    }

    /// pop the oldest linked value. single-consumer only.
    pub(super) fn try_pop(&self) -> Option<T> {
        let stub = self.head.load(Ordering::Relaxed);
        // safety: `stub` is owned by the consumer until replaced below
        let next = unsafe { (*stub).next.load(Ordering::Acquire) };

        if next.is_null() {
            return None;
        }

        self.head.store(next, Ordering::Relaxed);
        // safety: the acquire load above synchronized with the producer's
        // release store, so the node body is fully visible. `next` becomes
        // the new stub; its value is taken exactly once.
        let value = unsafe { (*next).value.take() };
        // safety: the old stub is unreachable from every producer (tail has
        // moved past it) and the consumer just moved head off it
        unsafe {
            drop(Box::from_raw(stub));
        }

        value
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // drain unconsumed values so their Drop runs, then free the final stub
        while self.try_pop().is_some() {}

        let stub = self.head.load(Ordering::Relaxed);
        // safety: exclusive access in Drop; after the drain the stub is the
        // only remaining node
        unsafe {
            drop(Box::from_raw(stub));
        }
    }
}

// safety: nodes are heap-allocated and ownership of values moves through
// the queue; the atomics above provide the synchronization
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}
