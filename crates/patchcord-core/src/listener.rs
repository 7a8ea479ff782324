//! Listener registrations and the typed listener handles.
//!
//! A listener handle ([`AttributeListener`], [`NameAndColourListener`],
//! [`OtherChangeListener`], [`BypassListener`], and the automation
//! [`ValueListener`](crate::ValueListener)) is owned by whoever created it.
//! It holds its callback and, while registered, an `Arc` to a
//! [`Registration`] record that is shared three ways:
//!
//! ```text
//!   listener handle ──┐
//!   source snapshot ──┼──► Registration { flavor + callback, pending bits, dirty flags }
//!   root registry ────┘          │
//!                                └──► Weak<source>
//! ```
//!
//! Producers only touch the source's snapshot (an `ArcSwap` load) and the
//! atomics inside each registration. Deregistration flips the record
//! inactive, clears its pending bits and removes it from both tables, so a
//! removed listener can never be called again, even if a flush already
//! picked its key off a queue.

use core::cell::RefCell;
use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use crate::automation::AutomationShared;
use crate::bitmap::{AtomicSlotBitmap, SetBits, SlotBitmap};
use crate::dispatch::{DispatchThread, DispatchType, QueuePriority};
use crate::error::DispatchError;
use crate::path::HashedPath;
use crate::processor::{ProcessorChangeEvent, ProcessorRef, ProcessorShared};
use crate::root::{RootObject, RootShared};

/// Stable handle of a registration in the root's table. Never reused.
pub(crate) type ListenerKey = u64;

pub(crate) type AttributeFn = dyn FnMut(&ProcessorRef, ChangedSlots<'_>) + Send;
pub(crate) type NameAndColourFn = dyn FnMut(&ProcessorRef) + Send;
pub(crate) type OtherChangeFn = dyn FnMut(&ProcessorRef, ProcessorChangeEvent) + Send;
pub(crate) type BypassFn = dyn FnMut(&ProcessorRef, bool) + Send;
pub(crate) type ValueFn = dyn FnMut(usize, f32) + Send;

/// The slots delivered with an attribute callback.
///
/// Synchronous dispatch reports the single slot that changed; a flush or a
/// resume catch-up reports the union of everything since the last delivery.
#[derive(Debug, Clone, Copy)]
pub enum ChangedSlots<'a> {
    /// One slot, from a synchronous request.
    Single(usize),
    /// A coalesced set of slots.
    Many(&'a SlotBitmap),
}

impl<'a> ChangedSlots<'a> {
    /// Whether `slot` is among the changed slots.
    pub fn contains(&self, slot: usize) -> bool {
        match self {
            ChangedSlots::Single(s) => *s == slot,
            ChangedSlots::Many(bitmap) => bitmap.get(slot),
        }
    }

    /// Number of changed slots.
    pub fn len(&self) -> usize {
        match self {
            ChangedSlots::Single(_) => 1,
            ChangedSlots::Many(bitmap) => bitmap.count_ones(),
        }
    }

    /// Whether no slot is reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest changed slot.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Iterate over the changed slots in ascending order.
    pub fn iter(&self) -> ChangedSlotsIter<'a> {
        match *self {
            ChangedSlots::Single(s) => ChangedSlotsIter::Single(Some(s)),
            ChangedSlots::Many(bitmap) => ChangedSlotsIter::Many(bitmap.iter()),
        }
    }
}

/// Iterator over [`ChangedSlots`].
#[derive(Debug, Clone)]
pub enum ChangedSlotsIter<'a> {
    /// Yields one slot.
    Single(Option<usize>),
    /// Yields the set bits of a bitmap.
    Many(SetBits<'a>),
}

impl Iterator for ChangedSlotsIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            ChangedSlotsIter::Single(slot) => slot.take(),
            ChangedSlotsIter::Many(bits) => bits.next(),
        }
    }
}

/// A callback shared between a listener handle and its registration.
///
/// The reentrant lock lets a callback trigger dispatch that reaches the
/// same listener again on the same thread; that nested delivery is skipped
/// instead of deadlocking. Another thread delivering to the same listener
/// waits.
pub(crate) struct CallbackCell<F: ?Sized> {
    inner: ReentrantMutex<RefCell<Box<F>>>,
}

impl<F: ?Sized> CallbackCell<F> {
    pub(crate) fn new(callback: Box<F>) -> Arc<Self> {
        Arc::new(Self {
            inner: ReentrantMutex::new(RefCell::new(callback)),
        })
    }

    /// Run `f` on the callback unless re-entered or `active` was cleared.
    fn invoke(&self, active: &AtomicBool, f: impl FnOnce(&mut F)) -> bool {
        let guard = self.inner.lock();
        let Ok(mut callback) = guard.try_borrow_mut() else {
            return false;
        };
        if !active.load(Ordering::Acquire) {
            return false;
        }
        f(&mut **callback);
        true
    }

    /// Block until no other thread is inside the callback. Returns at once
    /// when called from the callback itself.
    fn wait_idle(&self) {
        drop(self.inner.lock());
    }
}

/// What a registration listens to, with its typed callback.
pub(crate) enum Flavor {
    Attribute {
        interest: SlotBitmap,
        callback: Arc<CallbackCell<AttributeFn>>,
    },
    NameAndColour(Arc<CallbackCell<NameAndColourFn>>),
    OtherChange {
        filter: ProcessorChangeEvent,
        callback: Arc<CallbackCell<OtherChangeFn>>,
    },
    Bypass(Arc<CallbackCell<BypassFn>>),
    Value(Arc<CallbackCell<ValueFn>>),
}

/// Discriminant of [`Flavor`]; also selects the event path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FlavorKind {
    Attribute,
    NameAndColour,
    OtherChange,
    Bypass,
    Value,
}

impl FlavorKind {
    /// Last segment of the suspension path for events of this kind.
    pub(crate) fn path_segment(self) -> &'static str {
        match self {
            FlavorKind::Attribute => "attribute",
            FlavorKind::NameAndColour => "name",
            FlavorKind::OtherChange => "other",
            FlavorKind::Bypass => "bypass",
            FlavorKind::Value => "value",
        }
    }
}

impl Flavor {
    pub(crate) fn kind(&self) -> FlavorKind {
        match self {
            Flavor::Attribute { .. } => FlavorKind::Attribute,
            Flavor::NameAndColour(_) => FlavorKind::NameAndColour,
            Flavor::OtherChange { .. } => FlavorKind::OtherChange,
            Flavor::Bypass(_) => FlavorKind::Bypass,
            Flavor::Value(_) => FlavorKind::Value,
        }
    }

    /// Whether an event carrying `bit` concerns this listener.
    ///
    /// Attribute listeners filter by slot, other-change listeners by event
    /// kind (an `Any` message reaches every filter). The remaining flavors
    /// only ever see bit 0.
    #[inline]
    fn wants(&self, bit: usize) -> bool {
        match self {
            Flavor::Attribute { interest, .. } => interest.get(bit),
            Flavor::OtherChange { filter, .. } => {
                *filter == ProcessorChangeEvent::Any
                    || bit == filter.bit()
                    || bit == ProcessorChangeEvent::Any.bit()
            }
            _ => true,
        }
    }

    fn wait_idle(&self) {
        match self {
            Flavor::Attribute { callback, .. } => callback.wait_idle(),
            Flavor::NameAndColour(callback) => callback.wait_idle(),
            Flavor::OtherChange { callback, .. } => callback.wait_idle(),
            Flavor::Bypass(callback) => callback.wait_idle(),
            Flavor::Value(callback) => callback.wait_idle(),
        }
    }

    /// Size of the pending bitmaps this flavor needs.
    fn pending_bits(&self) -> usize {
        match self {
            Flavor::Attribute { interest, .. } => interest.highest_set_bit() + 1,
            Flavor::OtherChange { .. } => ProcessorChangeEvent::COUNT,
            _ => 1,
        }
    }
}

/// Non-owning link from a registration back to its event source.
pub(crate) enum SourceLink {
    Processor(Weak<ProcessorShared>),
    Automation(Weak<AutomationShared>),
}

/// One live listener registration.
pub(crate) struct Registration {
    pub(crate) key: ListenerKey,
    pub(crate) owner: String,
    pub(crate) thread: DispatchThread,
    pub(crate) registered: DispatchType,
    flavor: Flavor,
    source: SourceLink,
    pending: [AtomicSlotBitmap; QueuePriority::COUNT],
    dirty: [AtomicBool; QueuePriority::COUNT],
    missed: AtomicSlotBitmap,
    has_missed: AtomicBool,
    active: AtomicBool,
}

impl Registration {
    fn new(
        key: ListenerKey,
        base: &ListenerBase,
        registered: DispatchType,
        flavor: Flavor,
        source: SourceLink,
    ) -> Self {
        let bits = flavor.pending_bits();
        Self {
            key,
            owner: base.owner.clone(),
            thread: base.thread,
            registered,
            flavor,
            source,
            pending: [
                AtomicSlotBitmap::with_bits(bits),
                AtomicSlotBitmap::with_bits(bits),
            ],
            dirty: [AtomicBool::new(false), AtomicBool::new(false)],
            missed: AtomicSlotBitmap::with_bits(bits),
            has_missed: AtomicBool::new(false),
            active: AtomicBool::new(true),
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> FlavorKind {
        self.flavor.kind()
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether this registration is attached to `source`.
    pub(crate) fn is_on_processor(&self, source: &Arc<ProcessorShared>) -> bool {
        matches!(&self.source, SourceLink::Processor(p) if p.as_ptr() == Arc::as_ptr(source))
    }

    pub(crate) fn is_on_automation(&self, source: &Arc<AutomationShared>) -> bool {
        matches!(&self.source, SourceLink::Automation(s) if s.as_ptr() == Arc::as_ptr(source))
    }

    /// Stop all future deliveries and drop anything pending.
    ///
    /// Waits for a callback already running on another thread to return.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.flavor.wait_idle();
        for (pending, dirty) in self.pending.iter().zip(self.dirty.iter()) {
            dirty.store(false, Ordering::Release);
            pending.clear();
        }
        self.has_missed.store(false, Ordering::Release);
        self.missed.clear();
    }

    /// Remove this registration from its source's snapshot.
    fn detach_from_source(&self) {
        match &self.source {
            SourceLink::Processor(p) => {
                if let Some(p) = p.upgrade() {
                    p.detach(self.key);
                }
            }
            SourceLink::Automation(s) => {
                if let Some(s) = s.upgrade() {
                    s.detach(self.key);
                }
            }
        }
    }

    /// Record `bit` for the given queue. Returns `true` when the listener
    /// just became dirty and its key must be queued.
    #[inline]
    fn mark_pending(&self, priority: QueuePriority, bit: usize) -> bool {
        if !self.is_active() {
            return false;
        }
        let p = priority.index();
        self.pending[p].set(bit);
        !self.dirty[p].swap(true, Ordering::AcqRel)
    }

    #[inline]
    fn record_missed(&self, bit: usize) {
        self.missed.set(bit);
        self.has_missed.store(true, Ordering::Release);
    }

    pub(crate) fn has_missed(&self) -> bool {
        self.has_missed.load(Ordering::Acquire)
    }

    pub(crate) fn is_dirty(&self, priority: QueuePriority) -> bool {
        self.dirty[priority.index()].load(Ordering::Acquire)
    }

    /// Drain one pending queue into a single callback.
    ///
    /// The dirty flag is cleared before the bits are taken, so a producer
    /// racing with the flush either lands in this delivery or re-queues the
    /// listener for the next one.
    pub(crate) fn flush(&self, priority: QueuePriority) -> bool {
        let p = priority.index();
        if !self.dirty[p].swap(false, Ordering::AcqRel) {
            return false;
        }
        let mut changed = SlotBitmap::with_ceiling(self.pending[p].bits());
        self.pending[p].take_into(&mut changed);
        !changed.is_empty() && self.deliver(ChangedSlots::Many(&changed))
    }

    /// Run `f` on the current suspension path for this registration's
    /// events, or return `None` if the source is gone.
    pub(crate) fn with_event_path<R>(&self, f: impl FnOnce(&HashedPath) -> R) -> Option<R> {
        match &self.source {
            SourceLink::Processor(p) => {
                let p = p.upgrade()?;
                Some(f(p.paths().for_kind(self.kind())))
            }
            SourceLink::Automation(s) => {
                let s = s.upgrade()?;
                Some(f(s.path()))
            }
        }
    }

    /// Deliver the one notification owed for events dropped while
    /// suspended. A resume passes the registered dispatch type; a producer
    /// that raced the resume passes its own request.
    ///
    /// Returns `true` if a callback ran or was queued.
    pub(crate) fn catch_up(&self, root: &RootShared, dispatch: DispatchType) -> bool {
        if !self.has_missed.swap(false, Ordering::AcqRel) {
            return false;
        }
        let mut missed = SlotBitmap::with_ceiling(self.missed.bits());
        self.missed.take_into(&mut missed);
        if missed.is_empty() || !self.is_active() {
            return false;
        }

        match dispatch.queue_for(self.registered) {
            None => self.deliver(ChangedSlots::Many(&missed)),
            Some(priority) => {
                let p = priority.index();
                for bit in &missed {
                    self.pending[p].set(bit);
                }
                if !self.dirty[p].swap(true, Ordering::AcqRel) {
                    root.enqueue(self.thread, priority, self.key);
                }
                true
            }
        }
    }

    /// Invoke the callback now, on the calling thread.
    pub(crate) fn deliver(&self, changed: ChangedSlots<'_>) -> bool {
        if !self.is_active() {
            return false;
        }

        if let Flavor::Value(callback) = &self.flavor {
            let SourceLink::Automation(source) = &self.source else {
                return false;
            };
            let Some(source) = source.upgrade() else {
                return false;
            };
            let (index, value) = (source.index(), source.value());
            return callback.invoke(&self.active, |cb| cb(index, value));
        }

        let SourceLink::Processor(processor) = &self.source else {
            return false;
        };
        let Some(processor) = processor.upgrade() else {
            return false;
        };
        let processor = ProcessorRef::from_shared(processor);

        match &self.flavor {
            Flavor::Attribute { callback, .. } => {
                callback.invoke(&self.active, |cb| cb(&processor, changed))
            }
            Flavor::NameAndColour(callback) => callback.invoke(&self.active, |cb| cb(&processor)),
            Flavor::OtherChange { callback, .. } => {
                let event = ProcessorChangeEvent::from_changed(changed);
                callback.invoke(&self.active, |cb| cb(&processor, event))
            }
            Flavor::Bypass(callback) => {
                let bypassed = processor.is_bypassed();
                callback.invoke(&self.active, |cb| cb(&processor, bypassed))
            }
            Flavor::Value(_) => false,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("kind", &self.kind())
            .field("thread", &self.thread)
            .field("registered", &self.registered)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Send one event to every matching registration in a source's snapshot.
///
/// This is the producer path. It takes no locks except a listener's own
/// callback lock for synchronous delivery, and allocates nothing while
/// `path` is running. `request: None` means "use each listener's
/// registered type".
pub(crate) fn dispatch_to(
    root: &RootShared,
    listeners: &[Arc<Registration>],
    kind: FlavorKind,
    bit: usize,
    request: Option<DispatchType>,
    path: &HashedPath,
) {
    let suspended = root.suspension.is_suspended(path);
    for reg in listeners
        .iter()
        .filter(|r| r.kind() == kind && r.flavor.wants(bit))
    {
        let request = request.unwrap_or(reg.registered);

        if suspended {
            reg.record_missed(bit);
            root.stats.dropped_while_suspended.fetch_add(1, Ordering::Relaxed);

            // Pairs with the fence in `RootShared::catch_up`: either that
            // scan sees the missed bit, or this check sees the resume.
            fence(Ordering::SeqCst);
            if !root.suspension.is_suspended(path) && reg.catch_up(root, request) {
                root.stats.catch_ups.fetch_add(1, Ordering::Relaxed);
            }
            continue;
        }

        match request.queue_for(reg.registered) {
            None => {
                if reg.deliver(ChangedSlots::Single(bit)) {
                    root.stats.sync_callbacks.fetch_add(1, Ordering::Relaxed);
                }
            }
            Some(priority) => {
                if reg.mark_pending(priority, bit) {
                    root.enqueue(reg.thread, priority, reg.key);
                }
                root.stats.queued.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Registration state shared by every listener flavor.
///
/// Bound to one [`RootObject`] for life. The owner string is carried into
/// every registration for debugging. Dropping the base (or calling
/// [`clear_from_root`](Self::clear_from_root)) deregisters it.
pub struct ListenerBase {
    root: RootObject,
    owner: String,
    thread: DispatchThread,
    registration: Option<Arc<Registration>>,
}

impl ListenerBase {
    /// Create an unregistered base bound to `root`.
    pub fn new(root: &RootObject, owner: impl Into<String>) -> Self {
        Self {
            root: root.clone(),
            owner: owner.into(),
            thread: DispatchThread::Ui,
            registration: None,
        }
    }

    /// The root this listener is bound to.
    pub fn root(&self) -> &RootObject {
        &self.root
    }

    /// Owner label used in logs.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Thread asynchronous callbacks are delivered on.
    pub fn thread(&self) -> DispatchThread {
        self.thread
    }

    /// Change the callback thread. Applies from the next registration.
    pub fn set_thread(&mut self, thread: DispatchThread) {
        self.thread = thread;
    }

    /// Whether a live registration exists.
    ///
    /// Turns `false` when the listener is removed or its source is dropped.
    pub fn is_registered(&self) -> bool {
        self.registration.as_ref().is_some_and(|r| r.is_active())
    }

    /// Registered dispatch type, while registered.
    pub fn dispatch_type(&self) -> Option<DispatchType> {
        self.registration
            .as_ref()
            .filter(|r| r.is_active())
            .map(|r| r.registered)
    }

    /// Deregister from the root and the source.
    ///
    /// After this returns the callback is never invoked again. Safe to call
    /// when not registered.
    pub fn clear_from_root(&mut self) {
        if let Some(reg) = self.registration.take() {
            reg.deactivate();
            self.root.inner.unregister_listener(reg.key);
            reg.detach_from_source();

            #[cfg(feature = "tracing")]
            tracing::debug!(owner = %self.owner, key = reg.key, "listener removed");
        }
    }

    pub(crate) fn registration(&self) -> Option<&Arc<Registration>> {
        self.registration.as_ref().filter(|r| r.is_active())
    }

    /// Create and record a registration; the caller adds it to the source.
    pub(crate) fn register(
        &mut self,
        root: &RootObject,
        registered: DispatchType,
        flavor: Flavor,
        source: SourceLink,
    ) -> Result<Arc<Registration>, DispatchError> {
        if !self.root.ptr_eq(root) {
            return Err(DispatchError::ForeignRoot);
        }
        if self.is_registered() {
            return Err(DispatchError::AlreadyRegistered);
        }
        // A registration whose source died is stale; drop it first
        self.clear_from_root();

        let reg = Arc::new(Registration::new(
            root.inner.next_key(),
            self,
            registered,
            flavor,
            source,
        ));
        root.inner.register_listener(Arc::clone(&reg));
        self.registration = Some(Arc::clone(&reg));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            owner = %self.owner,
            key = reg.key,
            kind = ?reg.kind(),
            dispatch = %registered,
            thread = %self.thread,
            "listener added"
        );

        Ok(reg)
    }
}

impl Drop for ListenerBase {
    fn drop(&mut self) {
        self.clear_from_root();
    }
}

impl fmt::Debug for ListenerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBase")
            .field("owner", &self.owner)
            .field("thread", &self.thread)
            .field("registered", &self.is_registered())
            .finish_non_exhaustive()
    }
}

/// Listens to changes of selected attribute slots on one processor.
///
/// ```rust
/// use patchcord_core::{AttributeListener, DispatchType, Processor, RootObject};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let root = RootObject::new();
/// let processor = Processor::with_attributes(&root, "synth1", 8).unwrap();
///
/// let count = Arc::new(AtomicUsize::new(0));
/// let c = Arc::clone(&count);
/// let mut listener = AttributeListener::new(&root, "knob", move |_, changed| {
///     assert!(changed.contains(3));
///     c.fetch_add(1, Ordering::Relaxed);
/// });
///
/// processor
///     .add_attribute_listener(&mut listener, &[3], DispatchType::Sync)
///     .unwrap();
/// processor.set_attribute(3, 0.5, DispatchType::Sync);
/// assert_eq!(count.load(Ordering::Relaxed), 1);
/// ```
pub struct AttributeListener {
    base: ListenerBase,
    callback: Arc<CallbackCell<AttributeFn>>,
}

impl AttributeListener {
    /// Create an unregistered listener.
    pub fn new<F>(root: &RootObject, owner: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&ProcessorRef, ChangedSlots<'_>) + Send + 'static,
    {
        Self {
            base: ListenerBase::new(root, owner),
            callback: CallbackCell::new(Box::new(callback)),
        }
    }

    /// Deliver asynchronous callbacks on `thread`.
    #[must_use]
    pub fn on_thread(mut self, thread: DispatchThread) -> Self {
        self.base.set_thread(thread);
        self
    }

    /// Shared registration state.
    pub fn base(&self) -> &ListenerBase {
        &self.base
    }

    /// Mutable registration state.
    pub fn base_mut(&mut self) -> &mut ListenerBase {
        &mut self.base
    }

    /// Whether a live registration exists.
    pub fn is_registered(&self) -> bool {
        self.base.is_registered()
    }

    /// Deregister. See [`ListenerBase::clear_from_root`].
    pub fn clear_from_root(&mut self) {
        self.base.clear_from_root();
    }

    pub(crate) fn flavor(&self, interest: SlotBitmap) -> Flavor {
        Flavor::Attribute {
            interest,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl fmt::Debug for AttributeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeListener").field(&self.base).finish()
    }
}

/// Listens to renames and colour changes of one processor.
pub struct NameAndColourListener {
    base: ListenerBase,
    callback: Arc<CallbackCell<NameAndColourFn>>,
}

impl NameAndColourListener {
    /// Create an unregistered listener.
    pub fn new<F>(root: &RootObject, owner: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&ProcessorRef) + Send + 'static,
    {
        Self {
            base: ListenerBase::new(root, owner),
            callback: CallbackCell::new(Box::new(callback)),
        }
    }

    /// Deliver asynchronous callbacks on `thread`.
    #[must_use]
    pub fn on_thread(mut self, thread: DispatchThread) -> Self {
        self.base.set_thread(thread);
        self
    }

    /// Shared registration state.
    pub fn base(&self) -> &ListenerBase {
        &self.base
    }

    /// Mutable registration state.
    pub fn base_mut(&mut self) -> &mut ListenerBase {
        &mut self.base
    }

    /// Whether a live registration exists.
    pub fn is_registered(&self) -> bool {
        self.base.is_registered()
    }

    /// Deregister. See [`ListenerBase::clear_from_root`].
    pub fn clear_from_root(&mut self) {
        self.base.clear_from_root();
    }

    pub(crate) fn flavor(&self) -> Flavor {
        Flavor::NameAndColour(Arc::clone(&self.callback))
    }
}

impl fmt::Debug for NameAndColourListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NameAndColourListener")
            .field(&self.base)
            .finish()
    }
}

/// Listens to [`ProcessorChangeEvent`]s of one kind, or of any kind.
pub struct OtherChangeListener {
    base: ListenerBase,
    filter: ProcessorChangeEvent,
    callback: Arc<CallbackCell<OtherChangeFn>>,
}

impl OtherChangeListener {
    /// Create an unregistered listener for events of kind `filter`.
    ///
    /// With [`ProcessorChangeEvent::Any`] every kind is delivered.
    pub fn new<F>(
        root: &RootObject,
        owner: impl Into<String>,
        filter: ProcessorChangeEvent,
        callback: F,
    ) -> Self
    where
        F: FnMut(&ProcessorRef, ProcessorChangeEvent) + Send + 'static,
    {
        Self {
            base: ListenerBase::new(root, owner),
            filter,
            callback: CallbackCell::new(Box::new(callback)),
        }
    }

    /// Deliver asynchronous callbacks on `thread`.
    #[must_use]
    pub fn on_thread(mut self, thread: DispatchThread) -> Self {
        self.base.set_thread(thread);
        self
    }

    /// The event kind this listener accepts.
    pub fn filter(&self) -> ProcessorChangeEvent {
        self.filter
    }

    /// Shared registration state.
    pub fn base(&self) -> &ListenerBase {
        &self.base
    }

    /// Mutable registration state.
    pub fn base_mut(&mut self) -> &mut ListenerBase {
        &mut self.base
    }

    /// Whether a live registration exists.
    pub fn is_registered(&self) -> bool {
        self.base.is_registered()
    }

    /// Deregister. See [`ListenerBase::clear_from_root`].
    pub fn clear_from_root(&mut self) {
        self.base.clear_from_root();
    }

    pub(crate) fn flavor(&self) -> Flavor {
        Flavor::OtherChange {
            filter: self.filter,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl fmt::Debug for OtherChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtherChangeListener")
            .field("filter", &self.filter)
            .field("base", &self.base)
            .finish()
    }
}

/// Listens to bypass state changes of one processor.
pub struct BypassListener {
    base: ListenerBase,
    callback: Arc<CallbackCell<BypassFn>>,
}

impl BypassListener {
    /// Create an unregistered listener. The callback receives the bypass
    /// state at delivery time.
    pub fn new<F>(root: &RootObject, owner: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&ProcessorRef, bool) + Send + 'static,
    {
        Self {
            base: ListenerBase::new(root, owner),
            callback: CallbackCell::new(Box::new(callback)),
        }
    }

    /// Deliver asynchronous callbacks on `thread`.
    #[must_use]
    pub fn on_thread(mut self, thread: DispatchThread) -> Self {
        self.base.set_thread(thread);
        self
    }

    /// Shared registration state.
    pub fn base(&self) -> &ListenerBase {
        &self.base
    }

    /// Mutable registration state.
    pub fn base_mut(&mut self) -> &mut ListenerBase {
        &mut self.base
    }

    /// Whether a live registration exists.
    pub fn is_registered(&self) -> bool {
        self.base.is_registered()
    }

    /// Deregister. See [`ListenerBase::clear_from_root`].
    pub fn clear_from_root(&mut self) {
        self.base.clear_from_root();
    }

    pub(crate) fn flavor(&self) -> Flavor {
        Flavor::Bypass(Arc::clone(&self.callback))
    }
}

impl fmt::Debug for BypassListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BypassListener").field(&self.base).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_slots_single() {
        let changed = ChangedSlots::Single(4);
        assert!(changed.contains(4));
        assert!(!changed.contains(3));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.first(), Some(4));
        assert_eq!(changed.iter().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn changed_slots_many() {
        let bitmap = SlotBitmap::from_slots(&[3, 5], 32).unwrap();
        let changed = ChangedSlots::Many(&bitmap);
        assert!(changed.contains(3));
        assert!(changed.contains(5));
        assert!(!changed.contains(4));
        assert_eq!(changed.len(), 2);
        assert_eq!(changed.iter().collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn callback_cell_skips_inactive() {
        let cell: Arc<CallbackCell<ValueFn>> = CallbackCell::new(Box::new(|_, _| {}));
        let active = AtomicBool::new(false);
        assert!(!cell.invoke(&active, |cb| cb(0, 1.0)));
        active.store(true, Ordering::Release);
        assert!(cell.invoke(&active, |cb| cb(0, 1.0)));
    }

    #[test]
    fn callback_cell_skips_reentry() {
        let cell: Arc<CallbackCell<ValueFn>> = CallbackCell::new(Box::new(|_, _| {}));
        let active = AtomicBool::new(true);
        let nested = cell.invoke(&active, |_| {
            assert!(!cell.invoke(&active, |cb| cb(0, 0.0)));
        });
        assert!(nested);
    }

    #[test]
    fn other_change_filter_matching() {
        let root = RootObject::new();
        let custom = OtherChangeListener::new(&root, "t", ProcessorChangeEvent::Custom, |_, _| {});
        let any = OtherChangeListener::new(&root, "t", ProcessorChangeEvent::Any, |_, _| {});

        let custom = custom.flavor();
        let any = any.flavor();

        assert!(custom.wants(ProcessorChangeEvent::Custom.bit()));
        assert!(!custom.wants(ProcessorChangeEvent::Macro.bit()));
        assert!(custom.wants(ProcessorChangeEvent::Any.bit()));
        assert!(any.wants(ProcessorChangeEvent::Macro.bit()));
        assert!(any.wants(ProcessorChangeEvent::Custom.bit()));
    }
}
