//! Delivery timing and thread affinity.

use core::fmt;

/// When a change notification reaches its listeners.
///
/// The type is given twice: once when a listener registers and once with
/// every change request. A `Sync` request always wins and calls every
/// matching listener on the caller's thread. For asynchronous requests the
/// more urgent of the two picks the queue, see [`DispatchType::queue_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchType {
    /// Invoke listeners immediately on the calling thread.
    ///
    /// The dispatcher does not check which thread that is. Requesting `Sync`
    /// from the audio thread runs UI callbacks on the audio thread.
    Sync,
    /// Coalesce into the owning thread's normal queue.
    #[default]
    Async,
    /// Coalesce into the owning thread's high-priority queue.
    AsyncHighPriority,
}

impl DispatchType {
    /// Whether this type defers delivery.
    #[inline]
    pub fn is_async(self) -> bool {
        !matches!(self, DispatchType::Sync)
    }

    /// Queue for a request of type `self` to a listener registered as
    /// `registered`, or `None` for synchronous delivery.
    #[inline]
    pub fn queue_for(self, registered: DispatchType) -> Option<QueuePriority> {
        match (self, registered) {
            (DispatchType::Sync, _) => None,
            (DispatchType::AsyncHighPriority, _) | (_, DispatchType::AsyncHighPriority) => {
                Some(QueuePriority::High)
            }
            _ => Some(QueuePriority::Normal),
        }
    }
}

impl fmt::Display for DispatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchType::Sync => "sync",
            DispatchType::Async => "async",
            DispatchType::AsyncHighPriority => "async-high-priority",
        })
    }
}

/// One of the two coalescing queues every dispatch thread owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueuePriority {
    /// Drained by the periodic flush.
    Normal,
    /// Drained by the periodic flush and by explicit high-priority flushes.
    High,
}

impl QueuePriority {
    /// Number of priorities.
    pub const COUNT: usize = 2;

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            QueuePriority::Normal => 0,
            QueuePriority::High => 1,
        }
    }
}

/// The thread an asynchronous listener wants its callbacks on.
///
/// The dispatcher does not own these threads; the host calls
/// [`RootObject::flush_queues`](crate::RootObject::flush_queues) from each.
/// The audio thread is deliberately absent: it only produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchThread {
    /// The UI / message thread.
    #[default]
    Ui,
    /// A scripting thread.
    Scripting,
    /// A background loading thread.
    Loading,
}

impl DispatchThread {
    /// Number of dispatch threads.
    pub const COUNT: usize = 3;

    /// All dispatch threads.
    pub const ALL: [DispatchThread; Self::COUNT] = [
        DispatchThread::Ui,
        DispatchThread::Scripting,
        DispatchThread::Loading,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            DispatchThread::Ui => 0,
            DispatchThread::Scripting => 1,
            DispatchThread::Loading => 2,
        }
    }
}

impl fmt::Display for DispatchThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchThread::Ui => "ui",
            DispatchThread::Scripting => "scripting",
            DispatchThread::Loading => "loading",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_always_wins() {
        for registered in [
            DispatchType::Sync,
            DispatchType::Async,
            DispatchType::AsyncHighPriority,
        ] {
            assert_eq!(DispatchType::Sync.queue_for(registered), None);
        }
    }

    #[test]
    fn more_urgent_async_type_picks_queue() {
        use DispatchType::*;
        assert_eq!(Async.queue_for(Sync), Some(QueuePriority::Normal));
        assert_eq!(Async.queue_for(Async), Some(QueuePriority::Normal));
        assert_eq!(Async.queue_for(AsyncHighPriority), Some(QueuePriority::High));
        assert_eq!(AsyncHighPriority.queue_for(Sync), Some(QueuePriority::High));
        assert_eq!(AsyncHighPriority.queue_for(Async), Some(QueuePriority::High));
    }

    #[test]
    fn thread_indices_are_dense() {
        for (i, thread) in DispatchThread::ALL.iter().enumerate() {
            assert_eq!(thread.index(), i);
        }
    }
}
