//! The dispatch root: registry, queues, suspension and flushing.
//!
//! One [`RootObject`] exists per processing graph. It owns the
//! [`SuspensionTree`], one pair of key queues (normal and high priority) for
//! each [`DispatchThread`], and the registry that maps queued keys back to
//! registrations. Cloning a `RootObject` clones a handle to the same root.
//!
//! The registry mutex is taken only when listeners or processors are added
//! or removed, and by flushes while they look up the keys they drained.
//! Callbacks always run after the lock is released, so a callback may add or
//! remove listeners freely.

use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering, fence};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::automation::AutomationShared;
use crate::dispatch::{DispatchThread, QueuePriority};
use crate::error::DispatchError;
use crate::listener::{ListenerKey, Registration};
use crate::path::HashedPath;
use crate::processor::ProcessorShared;
use crate::queue::{DispatchQueue, FlushStats};
use crate::suspension::{SuspensionState, SuspensionTree};

/// Default [`RootConfig::bitmap_ceiling`].
pub const DEFAULT_SLOT_CEILING: usize = 8192;

/// Construction parameters of a [`RootObject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConfig {
    /// Hard ceiling on listener bitmaps, in bits. Attribute listeners
    /// cannot register for a slot at or past it, whatever the processor's
    /// attribute count.
    pub bitmap_ceiling: usize,
    /// Capacity of each key queue.
    pub queue_capacity: usize,
    /// First segment of processor suspension paths.
    pub processor_root: String,
    /// First segment of automation suspension paths.
    pub automation_root: String,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            bitmap_ceiling: DEFAULT_SLOT_CEILING,
            queue_capacity: 1024,
            processor_root: "modules".to_string(),
            automation_root: "automation".to_string(),
        }
    }
}

/// Cumulative counters since the root was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Callbacks run synchronously on a producer thread.
    pub sync_callbacks: u64,
    /// Events merged into a pending bitmap.
    pub queued: u64,
    /// Events dropped because their path was paused.
    pub dropped_while_suspended: u64,
    /// Catch-up notifications after a resume.
    pub catch_ups: u64,
    /// Keys that did not fit into a full queue.
    pub queue_overflows: u64,
    /// Callbacks run by flushes.
    pub flushed_callbacks: u64,
}

#[derive(Default)]
pub(crate) struct StatCounters {
    pub(crate) sync_callbacks: AtomicU64,
    pub(crate) queued: AtomicU64,
    pub(crate) dropped_while_suspended: AtomicU64,
    pub(crate) catch_ups: AtomicU64,
    pub(crate) queue_overflows: AtomicU64,
    pub(crate) flushed_callbacks: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            sync_callbacks: self.sync_callbacks.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped_while_suspended: self.dropped_while_suspended.load(Ordering::Relaxed),
            catch_ups: self.catch_ups.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            flushed_callbacks: self.flushed_callbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<ListenerKey, Arc<Registration>>,
    processors: HashMap<u64, Weak<ProcessorShared>>,
    automation: HashMap<u64, Weak<AutomationShared>>,
}

pub(crate) struct RootShared {
    config: RootConfig,
    processor_root: HashedPath,
    automation_root: HashedPath,
    pub(crate) suspension: SuspensionTree,
    queues: [[DispatchQueue; QueuePriority::COUNT]; DispatchThread::COUNT],
    registry: Mutex<Registry>,
    next_key: AtomicU64,
    pub(crate) stats: StatCounters,
}

impl RootShared {
    pub(crate) fn next_key(&self) -> u64 {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_listener(&self, reg: Arc<Registration>) {
        self.registry.lock().listeners.insert(reg.key, reg);
    }

    pub(crate) fn unregister_listener(&self, key: ListenerKey) {
        self.registry.lock().listeners.remove(&key);
    }

    pub(crate) fn register_processor(&self, processor: &Arc<ProcessorShared>) {
        self.registry
            .lock()
            .processors
            .insert(processor.key, Arc::downgrade(processor));
    }

    pub(crate) fn unregister_processor(&self, key: u64) {
        self.registry.lock().processors.remove(&key);
    }

    pub(crate) fn register_automation(&self, source: &Arc<AutomationShared>) {
        self.registry
            .lock()
            .automation
            .insert(source.key, Arc::downgrade(source));
    }

    pub(crate) fn unregister_automation(&self, key: u64) {
        self.registry.lock().automation.remove(&key);
    }

    fn queue(&self, thread: DispatchThread, priority: QueuePriority) -> &DispatchQueue {
        &self.queues[thread.index()][priority.index()]
    }

    /// Queue a listener that just became dirty. Lock-free.
    #[inline]
    pub(crate) fn enqueue(&self, thread: DispatchThread, priority: QueuePriority, key: ListenerKey) {
        if !self.queue(thread, priority).push(key) {
            self.stats.queue_overflows.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self, thread: DispatchThread, priority: QueuePriority) -> FlushStats {
        let queue = self.queue(thread, priority);
        let mut keys = Vec::with_capacity(queue.len());
        queue.drain_into(&mut keys);
        let overflowed = queue.take_overflow();
        if keys.is_empty() && !overflowed {
            return FlushStats::default();
        }

        let due: Vec<Arc<Registration>> = {
            let registry = self.registry.lock();
            if overflowed {
                // Keys were lost; every dirty listener of this thread is due
                registry
                    .listeners
                    .values()
                    .filter(|r| r.thread == thread && r.is_dirty(priority))
                    .cloned()
                    .collect()
            } else {
                keys.iter()
                    .filter_map(|key| registry.listeners.get(key).cloned())
                    .collect()
            }
        };

        let mut stats = FlushStats::default();
        for reg in &due {
            stats.listeners += 1;
            if reg.flush(priority) {
                stats.callbacks += 1;
            }
        }
        self.stats
            .flushed_callbacks
            .fetch_add(stats.callbacks as u64, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            %thread,
            ?priority,
            listeners = stats.listeners,
            callbacks = stats.callbacks,
            overflowed,
            "queue flushed"
        );

        stats
    }

    /// Deliver the catch-up owed to every listener whose stream is no
    /// longer suspended.
    fn catch_up(&self) -> usize {
        // Pairs with the fence producers issue after recording a missed bit
        fence(Ordering::SeqCst);
        let candidates: Vec<Arc<Registration>> = self
            .registry
            .lock()
            .listeners
            .values()
            .filter(|r| r.has_missed())
            .cloned()
            .collect();

        let mut delivered = 0;
        for reg in candidates {
            let resumed = reg
                .with_event_path(|path| !self.suspension.is_suspended(path))
                .unwrap_or(false);
            if resumed && reg.catch_up(self, reg.registered) {
                delivered += 1;
            }
        }
        self.stats
            .catch_ups
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }
}

/// Handle to a dispatch root.
///
/// ```rust
/// use patchcord_core::{
///     AttributeListener, DispatchThread, DispatchType, HashedPath, Processor, RootObject,
///     SuspensionState,
/// };
///
/// let root = RootObject::new();
/// let synth = Processor::with_attributes(&root, "synth1", 16).unwrap();
/// let mut listener = AttributeListener::new(&root, "editor", |_, changed| {
///     assert_eq!(changed.len(), 2);
/// });
/// synth
///     .add_attribute_listener(&mut listener, &[3, 5], DispatchType::Async)
///     .unwrap();
///
/// // From the audio thread: only sets bits.
/// for _ in 0..10 {
///     synth.set_attribute(3, 0.1, DispatchType::Async);
///     synth.set_attribute(5, 0.2, DispatchType::Async);
/// }
///
/// // On the UI timer: one coalesced callback.
/// let stats = root.flush_queues(DispatchThread::Ui);
/// assert_eq!(stats.callbacks, 1);
///
/// // Pausing a sub-tree drops events for it.
/// let path = HashedPath::parse("modules.*").unwrap();
/// root.set_state(&path, SuspensionState::Paused);
/// assert!(root.is_suspended(&synth.event_path("attribute")));
/// ```
#[derive(Clone)]
pub struct RootObject {
    pub(crate) inner: Arc<RootShared>,
}

impl RootObject {
    /// Create a root with the default configuration.
    pub fn new() -> Self {
        Self::build(
            RootConfig::default(),
            HashedPath::single("modules"),
            HashedPath::single("automation"),
        )
    }

    /// Create a root from `config`.
    ///
    /// The path roots must be valid dotted paths without wildcards. A zero
    /// queue capacity is raised to one.
    pub fn with_config(config: RootConfig) -> Result<Self, DispatchError> {
        let processor_root = parse_root(&config.processor_root)?;
        let automation_root = parse_root(&config.automation_root)?;
        Ok(Self::build(config, processor_root, automation_root))
    }

    fn build(config: RootConfig, processor_root: HashedPath, automation_root: HashedPath) -> Self {
        let capacity = config.queue_capacity.max(1);
        let queues = core::array::from_fn(|_| core::array::from_fn(|_| DispatchQueue::new(capacity)));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            processor_root = %processor_root,
            automation_root = %automation_root,
            queue_capacity = capacity,
            "dispatch root created"
        );

        Self {
            inner: Arc::new(RootShared {
                config,
                processor_root,
                automation_root,
                suspension: SuspensionTree::new(),
                queues,
                registry: Mutex::new(Registry::default()),
                next_key: AtomicU64::new(1),
                stats: StatCounters::default(),
            }),
        }
    }

    /// The configuration this root was built from.
    pub fn config(&self) -> &RootConfig {
        &self.inner.config
    }

    /// Prefix of every processor path.
    pub fn processor_root(&self) -> &HashedPath {
        &self.inner.processor_root
    }

    /// Prefix of every automation path.
    pub fn automation_root(&self) -> &HashedPath {
        &self.inner.automation_root
    }

    /// A slot bitmap sized with the configured ceiling.
    pub fn new_bitmap(&self) -> crate::SlotBitmap {
        crate::SlotBitmap::with_ceiling(self.inner.config.bitmap_ceiling)
    }

    /// Pause or resume a path pattern. Returns `true` if it changed.
    ///
    /// Resuming owes every listener that missed events exactly one
    /// notification, delivered according to its registered dispatch type:
    /// synchronously on this thread for `Sync` listeners, through the next
    /// flush of the listener's thread otherwise. Listeners still covered by
    /// another paused pattern keep waiting.
    pub fn set_state(&self, path: &HashedPath, state: SuspensionState) -> bool {
        let changed = self.inner.suspension.set_state(path, state);
        if changed {
            #[cfg(feature = "tracing")]
            tracing::debug!(%path, ?state, "suspension changed");

            if state == SuspensionState::Running {
                let delivered = self.inner.catch_up();

                #[cfg(feature = "tracing")]
                tracing::debug!(%path, delivered, "resume catch-up");
                #[cfg(not(feature = "tracing"))]
                let _ = delivered;
            }
        }
        changed
    }

    /// State of a pattern as last set with [`set_state`](Self::set_state).
    pub fn state(&self, path: &HashedPath) -> SuspensionState {
        self.inner.suspension.state(path)
    }

    /// Whether events addressed to `target` are currently dropped.
    pub fn is_suspended(&self, target: &HashedPath) -> bool {
        self.inner.suspension.is_suspended(target)
    }

    /// The suspension tree.
    pub fn suspension(&self) -> &SuspensionTree {
        &self.inner.suspension
    }

    /// Drain both queues of `thread`, high priority first.
    ///
    /// Call from `thread` itself, typically on a timer.
    pub fn flush_queues(&self, thread: DispatchThread) -> FlushStats {
        let mut stats = self.inner.flush(thread, QueuePriority::High);
        stats += self.inner.flush(thread, QueuePriority::Normal);
        stats
    }

    /// Drain only the high-priority queue of `thread`.
    pub fn flush_high_priority_queues(&self, thread: DispatchThread) -> FlushStats {
        self.inner.flush(thread, QueuePriority::High)
    }

    /// Number of live processors.
    pub fn num_processors(&self) -> usize {
        self.inner
            .registry
            .lock()
            .processors
            .values()
            .filter(|p| p.strong_count() > 0)
            .count()
    }

    /// Ids of the live processors, sorted.
    pub fn processor_ids(&self) -> Vec<String> {
        let live: Vec<Arc<ProcessorShared>> = self
            .inner
            .registry
            .lock()
            .processors
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        let mut ids: Vec<String> = live.iter().map(|p| p.id()).collect();
        ids.sort();
        ids
    }

    /// Number of live automation sources, across every manager.
    pub fn num_automation_sources(&self) -> usize {
        self.inner
            .registry
            .lock()
            .automation
            .values()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// Names of the live automation sources, sorted.
    pub fn automation_source_names(&self) -> Vec<String> {
        let live: Vec<Arc<AutomationShared>> = self
            .inner
            .registry
            .lock()
            .automation
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        let mut names: Vec<String> = live.iter().map(|s| s.name().to_string()).collect();
        names.sort();
        names
    }

    /// Number of live listener registrations.
    pub fn num_listeners(&self) -> usize {
        self.inner.registry.lock().listeners.len()
    }

    /// Cumulative dispatch counters.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.inner.stats.snapshot()
    }

    /// Whether both handles refer to the same root.
    pub fn ptr_eq(&self, other: &RootObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for RootObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RootObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootObject")
            .field("processor_root", &self.inner.processor_root)
            .field("automation_root", &self.inner.automation_root)
            .field("suspension", &self.inner.suspension)
            .field("stats", &self.dispatch_stats())
            .finish_non_exhaustive()
    }
}

fn parse_root(text: &str) -> Result<HashedPath, DispatchError> {
    let path = HashedPath::parse(text)?;
    if path.has_wildcard() {
        return Err(DispatchError::invalid_path(text, "root path cannot contain '*'"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeListener, DispatchType, Processor};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn default_config() {
        let config = RootConfig::default();
        assert_eq!(config.bitmap_ceiling, DEFAULT_SLOT_CEILING);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.processor_root, "modules");
        assert_eq!(config.automation_root, "automation");
    }

    #[test]
    fn custom_roots() {
        let root = RootObject::with_config(RootConfig {
            processor_root: "graph.nodes".to_string(),
            ..RootConfig::default()
        })
        .unwrap();
        let p = Processor::new(&root, "osc").unwrap();
        assert_eq!(p.path().as_str(), "graph.nodes.osc");
    }

    #[test]
    fn rejects_wildcard_roots() {
        let config = RootConfig {
            automation_root: "auto.*".to_string(),
            ..RootConfig::default()
        };
        assert!(RootObject::with_config(config).is_err());
    }

    #[test]
    fn new_bitmap_uses_ceiling() {
        let root = RootObject::with_config(RootConfig {
            bitmap_ceiling: 128,
            ..RootConfig::default()
        })
        .unwrap();
        let mut bitmap = root.new_bitmap();
        assert!(bitmap.set_bit(127, true).is_ok());
        assert!(bitmap.set_bit(128, true).is_err());
    }

    #[test]
    fn processor_registry() {
        let root = RootObject::new();
        let a = Processor::new(&root, "b_proc").unwrap();
        let b = Processor::new(&root, "a_proc").unwrap();
        assert_eq!(root.num_processors(), 2);
        assert_eq!(root.processor_ids(), vec!["a_proc", "b_proc"]);
        drop(a);
        assert_eq!(root.num_processors(), 1);
        drop(b);
        assert_eq!(root.num_processors(), 0);
    }

    #[test]
    fn automation_registry() {
        let root = RootObject::new();
        let manager = crate::CustomAutomationManager::new(&root);
        let cutoff = manager.add_source("cutoff", 0.0).unwrap();
        manager.add_source("gain", 1.0).unwrap();
        assert_eq!(root.num_automation_sources(), 2);
        assert_eq!(root.automation_source_names(), vec!["cutoff", "gain"]);

        manager.clear();
        assert_eq!(root.automation_source_names(), vec!["cutoff"], "still held");
        drop(cutoff);
        assert_eq!(root.num_automation_sources(), 0);
    }

    #[test]
    fn overflow_falls_back_to_scan() {
        let root = RootObject::with_config(RootConfig {
            queue_capacity: 1,
            ..RootConfig::default()
        })
        .unwrap();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let mut listeners: Vec<AttributeListener> = (0..3)
            .map(|i| {
                let c = Arc::clone(&count);
                let mut l = AttributeListener::new(&root, format!("l{i}"), move |_, _| {
                    c.fetch_add(1, Ordering::Relaxed);
                });
                p.add_attribute_listener(&mut l, &[i], DispatchType::Async)
                    .unwrap();
                l
            })
            .collect();

        for slot in 0..3 {
            p.set_attribute(slot, 0.0, DispatchType::Async);
        }
        assert_eq!(root.dispatch_stats().queue_overflows, 2);

        let stats = root.flush_queues(DispatchThread::Ui);
        assert_eq!(stats.callbacks, 3);
        assert_eq!(count.load(Ordering::Relaxed), 3);

        listeners.clear();
        assert_eq!(root.num_listeners(), 0);
    }

    #[test]
    fn threads_have_separate_queues() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut listener = AttributeListener::new(&root, "script", move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        })
        .on_thread(DispatchThread::Scripting);
        p.add_attribute_listener(&mut listener, &[0], DispatchType::Async)
            .unwrap();

        p.set_attribute(0, 1.0, DispatchType::Async);
        assert_eq!(root.flush_queues(DispatchThread::Ui).callbacks, 0);
        assert_eq!(root.flush_queues(DispatchThread::Scripting).callbacks, 1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stats_count_sync_and_queued() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        let mut listener = AttributeListener::new(&root, "t", |_, _| {});
        p.add_attribute_listener(&mut listener, &[1], DispatchType::Async)
            .unwrap();

        p.set_attribute(1, 0.0, DispatchType::Sync);
        p.set_attribute(1, 0.0, DispatchType::Async);
        p.set_attribute(1, 0.0, DispatchType::Async);
        root.flush_queues(DispatchThread::Ui);

        let stats = root.dispatch_stats();
        assert_eq!(stats.sync_callbacks, 1);
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.flushed_callbacks, 1);
        assert_eq!(stats.queue_overflows, 0);
    }
}
