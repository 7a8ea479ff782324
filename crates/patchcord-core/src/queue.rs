//! Bounded queues of dirty listener keys.
//!
//! One queue exists per (thread, priority) pair. A key is pushed when a
//! listener goes from clean to dirty, so the queue holds each listener at
//! most once between flushes no matter how many events were coalesced.
//! If the queue is full the key is dropped and an overflow flag is raised;
//! the next flush then scans the registry for dirty listeners instead of
//! trusting the queue.

use core::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::listener::ListenerKey;

pub(crate) struct DispatchQueue {
    keys: ArrayQueue<ListenerKey>,
    overflowed: AtomicBool,
}

impl DispatchQueue {
    /// `capacity` must be non-zero.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            keys: ArrayQueue::new(capacity),
            overflowed: AtomicBool::new(false),
        }
    }

    /// Push a key. Returns `false` if the queue was full.
    #[inline]
    pub(crate) fn push(&self, key: ListenerKey) -> bool {
        if self.keys.push(key).is_err() {
            self.overflowed.store(true, Ordering::Release);
            return false;
        }
        true
    }

    /// Pop every queued key into `out`.
    pub(crate) fn drain_into(&self, out: &mut Vec<ListenerKey>) {
        while let Some(key) = self.keys.pop() {
            out.push(key);
        }
    }

    /// Read and reset the overflow flag.
    pub(crate) fn take_overflow(&self) -> bool {
        self.overflowed.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

impl core::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("len", &self.keys.len())
            .field("capacity", &self.keys.capacity())
            .field("overflowed", &self.overflowed.load(Ordering::Relaxed))
            .finish()
    }
}

/// What one flush delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Listeners examined.
    pub listeners: usize,
    /// Callbacks invoked.
    pub callbacks: usize,
}

impl AddAssign for FlushStats {
    fn add_assign(&mut self, rhs: Self) {
        self.listeners += rhs.listeners;
        self.callbacks += rhs.callbacks;
    }
}
