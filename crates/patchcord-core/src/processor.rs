//! Processors: the entities attribute, bypass and rename events are about.
//!
//! A [`Processor`] is the owning handle held by the audio graph. Listeners
//! receive a cheap [`ProcessorRef`] to read its current state. All fields a
//! producer touches are atomics or `ArcSwap` snapshots, so every producer
//! call may come from the audio thread.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use arc_swap::{ArcSwap, Guard};
use parking_lot::RwLock;

use crate::bitmap::SlotBitmap;
use crate::dispatch::DispatchType;
use crate::error::DispatchError;
use crate::listener::{
    AttributeListener, BypassListener, ChangedSlots, Flavor, FlavorKind, ListenerBase, ListenerKey,
    NameAndColourListener, OtherChangeListener, Registration, SourceLink, dispatch_to,
};
use crate::path::{HashedPath, validate_segment};
use crate::root::RootObject;

/// Kinds of miscellaneous processor change, sent with
/// [`Processor::send_change_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorChangeEvent {
    /// Unspecified change. Sent, it reaches every other-change listener;
    /// as a filter, it accepts every kind.
    Any,
    /// The attribute layout changed.
    Attribute,
    /// Bypass was toggled.
    Bypassed,
    /// The processor's intensity (wet amount) changed.
    Intensity,
    /// A preset was loaded.
    Preset,
    /// A host-defined change.
    Custom,
    /// A macro assignment changed.
    Macro,
}

impl ProcessorChangeEvent {
    /// Number of kinds.
    pub const COUNT: usize = 7;

    /// Every kind, in bit order.
    pub const ALL: [ProcessorChangeEvent; Self::COUNT] = [
        ProcessorChangeEvent::Any,
        ProcessorChangeEvent::Attribute,
        ProcessorChangeEvent::Bypassed,
        ProcessorChangeEvent::Intensity,
        ProcessorChangeEvent::Preset,
        ProcessorChangeEvent::Custom,
        ProcessorChangeEvent::Macro,
    ];

    #[inline]
    pub(crate) fn bit(self) -> usize {
        self as usize
    }

    pub(crate) fn from_bit(bit: usize) -> Option<Self> {
        Self::ALL.get(bit).copied()
    }

    /// A single kind is reported as itself, a coalesced mix as `Any`.
    pub(crate) fn from_changed(changed: ChangedSlots<'_>) -> Self {
        if changed.len() == 1 {
            changed
                .first()
                .and_then(Self::from_bit)
                .unwrap_or(ProcessorChangeEvent::Any)
        } else {
            ProcessorChangeEvent::Any
        }
    }
}

impl fmt::Display for ProcessorChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessorChangeEvent::Any => "any",
            ProcessorChangeEvent::Attribute => "attribute",
            ProcessorChangeEvent::Bypassed => "bypassed",
            ProcessorChangeEvent::Intensity => "intensity",
            ProcessorChangeEvent::Preset => "preset",
            ProcessorChangeEvent::Custom => "custom",
            ProcessorChangeEvent::Macro => "macro",
        })
    }
}

/// Display colour, packed ARGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Colour(pub u32);

impl Colour {
    /// Colour of a freshly created processor.
    pub const GREY: Colour = Colour(0xFF80_8080);

    /// Pack from components.
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Colour(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Opaque colour from components.
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_argb(0xFF, r, g, b)
    }

    /// Alpha component.
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Red component.
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Green component.
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Blue component.
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::GREY
    }
}

/// Suspension paths for each event stream of one processor.
pub(crate) struct ProcessorPaths {
    base: HashedPath,
    attribute: HashedPath,
    name: HashedPath,
    other: HashedPath,
    bypass: HashedPath,
}

impl ProcessorPaths {
    fn new(root: &HashedPath, id: &str) -> Self {
        let base = root.child(id);
        Self {
            attribute: base.child(FlavorKind::Attribute.path_segment()),
            name: base.child(FlavorKind::NameAndColour.path_segment()),
            other: base.child(FlavorKind::OtherChange.path_segment()),
            bypass: base.child(FlavorKind::Bypass.path_segment()),
            base,
        }
    }

    pub(crate) fn for_kind(&self, kind: FlavorKind) -> &HashedPath {
        match kind {
            FlavorKind::Attribute => &self.attribute,
            FlavorKind::NameAndColour => &self.name,
            FlavorKind::OtherChange => &self.other,
            FlavorKind::Bypass => &self.bypass,
            FlavorKind::Value => &self.base,
        }
    }
}

/// State shared between a [`Processor`], its [`ProcessorRef`]s and the
/// registrations that point back at it.
pub(crate) struct ProcessorShared {
    pub(crate) key: u64,
    root: RootObject,
    id: RwLock<String>,
    paths: ArcSwap<ProcessorPaths>,
    colour: AtomicU32,
    bypassed: AtomicBool,
    num_attributes: AtomicUsize,
    listeners: ArcSwap<Vec<Arc<Registration>>>,
}

impl ProcessorShared {
    pub(crate) fn id(&self) -> String {
        self.id.read().clone()
    }

    pub(crate) fn paths(&self) -> Guard<Arc<ProcessorPaths>> {
        self.paths.load()
    }

    fn attach(&self, reg: Arc<Registration>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&reg));
            next
        });
    }

    pub(crate) fn detach(&self, key: ListenerKey) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|r| r.key != key)
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Deactivate and deregister every listener. Used when the owner drops.
    fn detach_all(&self) {
        let listeners = self.listeners.swap(Arc::new(Vec::new()));
        for reg in listeners.iter() {
            reg.deactivate();
            self.root.inner.unregister_listener(reg.key);
        }
    }

    #[inline]
    fn dispatch(&self, kind: FlavorKind, bit: usize, request: Option<DispatchType>) {
        let listeners = self.listeners.load();
        if listeners.is_empty() {
            return;
        }
        let paths = self.paths.load();
        dispatch_to(
            &self.root.inner,
            &listeners,
            kind,
            bit,
            request,
            paths.for_kind(kind),
        );
    }
}

/// An entity whose attribute, bypass, rename and colour changes are
/// dispatched to listeners.
///
/// Owned by the audio graph; not `Clone`. Dropping it deregisters the
/// processor from its root and permanently deactivates every listener
/// registration attached to it.
pub struct Processor {
    shared: Arc<ProcessorShared>,
}

impl Processor {
    /// Create a processor with no attributes.
    ///
    /// `id` becomes a path segment, so it must be non-empty ASCII without
    /// `.` and must not be `*`.
    pub fn new(root: &RootObject, id: impl Into<String>) -> Result<Self, DispatchError> {
        let id = id.into();
        validate_id(&id)?;

        let shared = Arc::new(ProcessorShared {
            key: root.inner.next_key(),
            root: root.clone(),
            paths: ArcSwap::from_pointee(ProcessorPaths::new(root.processor_root(), &id)),
            id: RwLock::new(id),
            colour: AtomicU32::new(Colour::GREY.0),
            bypassed: AtomicBool::new(false),
            num_attributes: AtomicUsize::new(0),
            listeners: ArcSwap::from_pointee(Vec::new()),
        });
        root.inner.register_processor(&shared);

        #[cfg(feature = "tracing")]
        tracing::debug!(id = %shared.id(), key = shared.key, "processor created");

        Ok(Self { shared })
    }

    /// Create a processor and set its attribute count.
    pub fn with_attributes(
        root: &RootObject,
        id: impl Into<String>,
        num_attributes: usize,
    ) -> Result<Self, DispatchError> {
        let processor = Self::new(root, id)?;
        processor.set_num_attributes(num_attributes);
        Ok(processor)
    }

    /// A shared, read-only reference to this processor.
    pub fn handle(&self) -> ProcessorRef {
        ProcessorRef {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The root this processor is registered with.
    pub fn root(&self) -> &RootObject {
        &self.shared.root
    }

    /// Current id.
    pub fn id(&self) -> String {
        self.shared.id()
    }

    /// Base suspension path, `{processor_root}.{id}`.
    pub fn path(&self) -> HashedPath {
        self.shared.paths().base.clone()
    }

    /// Suspension path of one event stream: `attribute`, `name`, `other`
    /// or `bypass` below [`path`](Self::path).
    pub fn event_path(&self, stream: &str) -> HashedPath {
        self.shared.paths().base.child(stream)
    }

    /// Rename. Notifies every name-and-colour listener using its
    /// registered dispatch type.
    ///
    /// The suspension paths move with the id; pauses addressed to the old
    /// id no longer apply.
    pub fn set_id(&self, new_id: impl Into<String>) -> Result<(), DispatchError> {
        let new_id = new_id.into();
        validate_id(&new_id)?;
        {
            let mut id = self.shared.id.write();
            if *id == new_id {
                return Ok(());
            }
            self.shared.paths.store(Arc::new(ProcessorPaths::new(
                self.shared.root.processor_root(),
                &new_id,
            )));

            #[cfg(feature = "tracing")]
            tracing::debug!(from = %*id, to = %new_id, "processor renamed");

            *id = new_id;
        }
        self.shared.dispatch(FlavorKind::NameAndColour, 0, None);
        Ok(())
    }

    /// Current colour.
    pub fn colour(&self) -> Colour {
        Colour(self.shared.colour.load(Ordering::Relaxed))
    }

    /// Recolour. Notifies name-and-colour listeners if the colour changed.
    pub fn set_colour(&self, colour: Colour) {
        if self.shared.colour.swap(colour.0, Ordering::AcqRel) != colour.0 {
            self.shared.dispatch(FlavorKind::NameAndColour, 0, None);
        }
    }

    /// Whether the processor is bypassed.
    pub fn is_bypassed(&self) -> bool {
        self.shared.bypassed.load(Ordering::Acquire)
    }

    /// Set the bypass flag. Notifies bypass listeners only on a change.
    pub fn set_bypassed(&self, bypassed: bool, dispatch: DispatchType) {
        if self.shared.bypassed.swap(bypassed, Ordering::AcqRel) != bypassed {
            self.shared.dispatch(FlavorKind::Bypass, 0, Some(dispatch));
        }
    }

    /// Number of addressable attribute slots.
    pub fn num_attributes(&self) -> usize {
        self.shared.num_attributes.load(Ordering::Acquire)
    }

    /// Set the number of attribute slots. Must happen before listeners
    /// register for a slot; existing registrations keep their interest.
    pub fn set_num_attributes(&self, num_attributes: usize) {
        self.shared
            .num_attributes
            .store(num_attributes, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::trace!(id = %self.shared.id(), num_attributes, "attribute count set");
    }

    /// Report a change of attribute `slot`.
    ///
    /// The value itself is not stored; listeners read it from their own
    /// model. With an async type this only sets a bit and, at most once per
    /// listener between flushes, pushes a key to a lock-free queue.
    /// Slots past [`num_attributes`](Self::num_attributes) are a programmer
    /// error and are dropped.
    #[inline]
    pub fn set_attribute(&self, slot: usize, _value: f32, dispatch: DispatchType) {
        let count = self.shared.num_attributes.load(Ordering::Acquire);
        debug_assert!(
            slot < count,
            "attribute {slot} out of range ({count} attributes)"
        );
        if slot >= count {
            return;
        }
        self.shared
            .dispatch(FlavorKind::Attribute, slot, Some(dispatch));
    }

    /// Send a miscellaneous change to other-change listeners whose filter
    /// is `kind` or `Any`.
    pub fn send_change_message(&self, kind: ProcessorChangeEvent, dispatch: DispatchType) {
        self.shared
            .dispatch(FlavorKind::OtherChange, kind.bit(), Some(dispatch));
    }

    /// Register `listener` for changes to `slots`.
    ///
    /// Fails with [`DispatchError::AttributeOutOfRange`] if a slot is past
    /// the attribute count, and with [`DispatchError::OutOfRange`] if it is
    /// past the root's [`bitmap_ceiling`](crate::RootConfig::bitmap_ceiling).
    pub fn add_attribute_listener(
        &self,
        listener: &mut AttributeListener,
        slots: &[usize],
        dispatch: DispatchType,
    ) -> Result<(), DispatchError> {
        let count = self.num_attributes();
        if let Some(&slot) = slots.iter().find(|&&slot| slot >= count) {
            return Err(DispatchError::AttributeOutOfRange {
                processor: self.id(),
                slot,
                count,
            });
        }
        let ceiling = self.shared.root.config().bitmap_ceiling;
        if let Some(&slot) = slots.iter().find(|&&slot| slot >= ceiling) {
            return Err(DispatchError::OutOfRange {
                index: slot,
                ceiling,
            });
        }
        let interest = SlotBitmap::from_slots(slots, count.min(ceiling).max(1))?;
        let flavor = listener.flavor(interest);
        self.attach(listener.base_mut(), dispatch, flavor)
    }

    /// Deregister an attribute listener added to this processor.
    pub fn remove_attribute_listener(
        &self,
        listener: &mut AttributeListener,
    ) -> Result<(), DispatchError> {
        self.detach(listener.base_mut())
    }

    /// Register a name-and-colour listener.
    pub fn add_name_and_colour_listener(
        &self,
        listener: &mut NameAndColourListener,
        dispatch: DispatchType,
    ) -> Result<(), DispatchError> {
        let flavor = listener.flavor();
        self.attach(listener.base_mut(), dispatch, flavor)
    }

    /// Deregister a name-and-colour listener.
    pub fn remove_name_and_colour_listener(
        &self,
        listener: &mut NameAndColourListener,
    ) -> Result<(), DispatchError> {
        self.detach(listener.base_mut())
    }

    /// Register an other-change listener.
    pub fn add_other_change_listener(
        &self,
        listener: &mut OtherChangeListener,
        dispatch: DispatchType,
    ) -> Result<(), DispatchError> {
        let flavor = listener.flavor();
        self.attach(listener.base_mut(), dispatch, flavor)
    }

    /// Deregister an other-change listener.
    pub fn remove_other_change_listener(
        &self,
        listener: &mut OtherChangeListener,
    ) -> Result<(), DispatchError> {
        self.detach(listener.base_mut())
    }

    /// Register a bypass listener.
    pub fn add_bypass_listener(
        &self,
        listener: &mut BypassListener,
        dispatch: DispatchType,
    ) -> Result<(), DispatchError> {
        let flavor = listener.flavor();
        self.attach(listener.base_mut(), dispatch, flavor)
    }

    /// Deregister a bypass listener.
    pub fn remove_bypass_listener(
        &self,
        listener: &mut BypassListener,
    ) -> Result<(), DispatchError> {
        self.detach(listener.base_mut())
    }

    /// Number of listeners of all flavors currently attached.
    pub fn num_listeners(&self) -> usize {
        self.shared.listeners.load().len()
    }

    fn attach(
        &self,
        base: &mut ListenerBase,
        dispatch: DispatchType,
        flavor: Flavor,
    ) -> Result<(), DispatchError> {
        let reg = base.register(
            &self.shared.root,
            dispatch,
            flavor,
            SourceLink::Processor(Arc::downgrade(&self.shared)),
        )?;
        self.shared.attach(reg);
        Ok(())
    }

    fn detach(&self, base: &mut ListenerBase) -> Result<(), DispatchError> {
        let ours = base
            .registration()
            .is_some_and(|reg| reg.is_on_processor(&self.shared));
        if !ours {
            return Err(DispatchError::NotRegistered);
        }
        base.clear_from_root();
        Ok(())
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.shared.detach_all();
        self.shared.root.inner.unregister_processor(self.shared.key);

        #[cfg(feature = "tracing")]
        tracing::debug!(id = %self.shared.id(), key = self.shared.key, "processor dropped");
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id())
            .field("num_attributes", &self.num_attributes())
            .field("num_listeners", &self.num_listeners())
            .finish_non_exhaustive()
    }
}

/// Read-only view of a processor, passed to listener callbacks.
#[derive(Clone)]
pub struct ProcessorRef {
    shared: Arc<ProcessorShared>,
}

impl ProcessorRef {
    pub(crate) fn from_shared(shared: Arc<ProcessorShared>) -> Self {
        Self { shared }
    }

    /// Current id.
    pub fn id(&self) -> String {
        self.shared.id()
    }

    /// Current colour.
    pub fn colour(&self) -> Colour {
        Colour(self.shared.colour.load(Ordering::Relaxed))
    }

    /// Current bypass flag.
    pub fn is_bypassed(&self) -> bool {
        self.shared.bypassed.load(Ordering::Acquire)
    }

    /// Number of attribute slots.
    pub fn num_attributes(&self) -> usize {
        self.shared.num_attributes.load(Ordering::Acquire)
    }

    /// Base suspension path.
    pub fn path(&self) -> HashedPath {
        self.shared.paths().base.clone()
    }

    /// Whether this refers to `processor`.
    pub fn is(&self, processor: &Processor) -> bool {
        Arc::ptr_eq(&self.shared, &processor.shared)
    }
}

impl fmt::Debug for ProcessorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProcessorRef").field(&self.id()).finish()
    }
}

fn validate_id(id: &str) -> Result<(), DispatchError> {
    validate_segment(id)?;
    if id == "*" {
        return Err(DispatchError::invalid_path(id, "processor id cannot be '*'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&c), c)
    }

    #[test]
    fn colour_components() {
        let c = Colour::from_rgb(0x12, 0x34, 0x56);
        assert_eq!(c.0, 0xFF12_3456);
        assert_eq!(c.alpha(), 0xFF);
        assert_eq!(c.red(), 0x12);
        assert_eq!(c.green(), 0x34);
        assert_eq!(c.blue(), 0x56);
        assert_eq!(Colour::default(), Colour::GREY);
    }

    #[test]
    fn change_event_bits_round_trip() {
        for kind in ProcessorChangeEvent::ALL {
            assert_eq!(ProcessorChangeEvent::from_bit(kind.bit()), Some(kind));
        }
        assert_eq!(ProcessorChangeEvent::from_bit(99), None);
    }

    #[test]
    fn mixed_change_events_report_any() {
        let bits = SlotBitmap::from_slots(
            &[
                ProcessorChangeEvent::Custom.bit(),
                ProcessorChangeEvent::Macro.bit(),
            ],
            32,
        )
        .unwrap();
        assert_eq!(
            ProcessorChangeEvent::from_changed(ChangedSlots::Many(&bits)),
            ProcessorChangeEvent::Any
        );
        assert_eq!(
            ProcessorChangeEvent::from_changed(ChangedSlots::Single(
                ProcessorChangeEvent::Preset.bit()
            )),
            ProcessorChangeEvent::Preset
        );
    }

    #[test]
    fn rejects_bad_ids() {
        let root = RootObject::new();
        assert!(Processor::new(&root, "").is_err());
        assert!(Processor::new(&root, "a.b").is_err());
        assert!(Processor::new(&root, "*").is_err());
        assert!(Processor::new(&root, "synth1").is_ok());
    }

    #[test]
    fn paths_follow_id() {
        let root = RootObject::new();
        let p = Processor::new(&root, "synth1").unwrap();
        assert_eq!(p.path().as_str(), "modules.synth1");
        assert_eq!(p.event_path("bypass").as_str(), "modules.synth1.bypass");

        p.set_id("synth2").unwrap();
        assert_eq!(p.id(), "synth2");
        assert_eq!(p.path().as_str(), "modules.synth2");
    }

    #[test]
    fn rename_and_recolour_notify() {
        let root = RootObject::new();
        let p = Processor::new(&root, "synth1").unwrap();
        let (count, c) = counter();
        let mut listener = NameAndColourListener::new(&root, "test", move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        p.add_name_and_colour_listener(&mut listener, DispatchType::Sync)
            .unwrap();

        p.set_id("synth2").unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
        p.set_id("synth2").unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1, "same id is not a change");

        p.set_colour(Colour::from_rgb(1, 2, 3));
        assert_eq!(count.load(Ordering::Relaxed), 2);
        p.set_colour(Colour::from_rgb(1, 2, 3));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn bypass_notifies_on_change_only() {
        let root = RootObject::new();
        let p = Processor::new(&root, "fx").unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let mut listener = BypassListener::new(&root, "test", move |_, bypassed| {
            s.lock().push(bypassed);
        });
        p.add_bypass_listener(&mut listener, DispatchType::Sync)
            .unwrap();

        p.set_bypassed(true, DispatchType::Sync);
        p.set_bypassed(true, DispatchType::Sync);
        p.set_bypassed(false, DispatchType::Sync);
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn listener_sees_processor_state() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let s = Arc::clone(&seen);
        let mut listener = AttributeListener::new(&root, "test", move |processor, _| {
            *s.lock() = processor.id();
        });
        p.add_attribute_listener(&mut listener, &[0], DispatchType::Sync)
            .unwrap();
        p.set_attribute(0, 1.0, DispatchType::Sync);
        assert_eq!(*seen.lock(), "synth1");
    }

    #[test]
    fn attribute_registration_is_bounded_by_count() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        let mut listener = AttributeListener::new(&root, "test", |_, _| {});
        let err = p
            .add_attribute_listener(&mut listener, &[1, 4], DispatchType::Sync)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::AttributeOutOfRange {
                processor: "synth1".to_string(),
                slot: 4,
                count: 4,
            }
        );
        assert!(!listener.is_registered());
    }

    #[test]
    fn attribute_registration_is_bounded_by_root_ceiling() {
        let root = RootObject::with_config(crate::RootConfig {
            bitmap_ceiling: 32,
            ..crate::RootConfig::default()
        })
        .unwrap();
        let p = Processor::with_attributes(&root, "big", 100_000).unwrap();
        let mut listener = AttributeListener::new(&root, "test", |_, _| {});

        let err = p
            .add_attribute_listener(&mut listener, &[0, 99_999], DispatchType::Sync)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::OutOfRange {
                index: 99_999,
                ceiling: 32,
            }
        );
        assert!(!listener.is_registered());

        p.add_attribute_listener(&mut listener, &[0, 31], DispatchType::Sync)
            .unwrap();
        assert!(listener.is_registered());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn out_of_range_set_attribute_panics_in_debug() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        p.set_attribute(4, 0.0, DispatchType::Sync);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn out_of_range_set_attribute_is_dropped_in_release() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        let (count, c) = counter();
        let mut listener = AttributeListener::new(&root, "test", move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        p.add_attribute_listener(&mut listener, &[0, 3], DispatchType::Async)
            .unwrap();

        p.set_attribute(4, 0.0, DispatchType::Sync);
        p.set_attribute(4, 0.0, DispatchType::Async);
        assert_eq!(root.flush_queues(crate::DispatchThread::Ui).callbacks, 0);
        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(root.dispatch_stats().queued, 0);
    }

    #[test]
    fn remove_from_wrong_processor_fails() {
        let root = RootObject::new();
        let a = Processor::with_attributes(&root, "a", 4).unwrap();
        let b = Processor::with_attributes(&root, "b", 4).unwrap();
        let mut listener = AttributeListener::new(&root, "test", |_, _| {});
        a.add_attribute_listener(&mut listener, &[0], DispatchType::Sync)
            .unwrap();

        assert_eq!(
            b.remove_attribute_listener(&mut listener),
            Err(DispatchError::NotRegistered)
        );
        assert!(listener.is_registered());
        assert_eq!(a.remove_attribute_listener(&mut listener), Ok(()));
        assert!(!listener.is_registered());
        assert_eq!(a.num_listeners(), 0);
    }

    #[test]
    fn dropping_processor_deactivates_listeners() {
        let root = RootObject::new();
        let p = Processor::with_attributes(&root, "synth1", 4).unwrap();
        let mut listener = AttributeListener::new(&root, "test", |_, _| {});
        p.add_attribute_listener(&mut listener, &[0], DispatchType::Async)
            .unwrap();
        p.set_attribute(0, 0.0, DispatchType::Async);

        drop(p);
        assert!(!listener.is_registered());
        assert_eq!(root.num_processors(), 0);
        assert_eq!(root.num_listeners(), 0);
        assert_eq!(root.flush_queues(crate::DispatchThread::Ui).callbacks, 0);
    }
}
