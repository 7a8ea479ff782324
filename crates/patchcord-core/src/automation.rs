//! Host-driven automation values.
//!
//! A [`CustomAutomationSource`] is a named single float that is not owned by
//! any processor: a macro knob, a host automation lane, a scripted
//! modulation. It has its own listener list and its own suspension path,
//! `{automation_root}.{name}.value`. The [`CustomAutomationManager`] owns
//! the ordered set of sources; a source's index is its position there.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::dispatch::{DispatchThread, DispatchType};
use crate::error::DispatchError;
use crate::listener::{
    CallbackCell, ChangedSlots, Flavor, FlavorKind, ListenerBase, ListenerKey, Registration,
    SourceLink, ValueFn, dispatch_to,
};
use crate::path::{HashedPath, validate_segment};
use crate::root::RootObject;

pub(crate) struct AutomationShared {
    pub(crate) key: u64,
    index: usize,
    name: String,
    path: HashedPath,
    value: AtomicU32,
    root: RootObject,
    listeners: ArcSwap<Vec<Arc<Registration>>>,
}

impl AutomationShared {
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    pub(crate) fn path(&self) -> &HashedPath {
        &self.path
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
}

impl Drop for AutomationShared {
    fn drop(&mut self) {
        for reg in self.listeners.load().iter() {
            reg.deactivate();
            self.root.inner.unregister_listener(reg.key);
        }
        self.root.inner.unregister_automation(self.key);
    }
}

/// One automation value with its listeners.
///
/// Cheap to clone; clones refer to the same source. The source lives as
/// long as any clone or the manager holds it.
#[derive(Clone)]
pub struct CustomAutomationSource {
    shared: Arc<AutomationShared>,
}

impl CustomAutomationSource {
    /// Source name, unique within its manager.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Position in the manager.
    pub fn index(&self) -> usize {
        self.shared.index
    }

    /// Current value.
    pub fn value(&self) -> f32 {
        self.shared.value()
    }

    /// Suspension path of this source's value stream.
    pub fn path(&self) -> &HashedPath {
        &self.shared.path
    }

    /// Store a new value and notify value listeners.
    ///
    /// Safe to call from the audio thread with an async type.
    #[inline]
    pub fn set_value(&self, value: f32, dispatch: DispatchType) {
        self.shared.value.store(value.to_bits(), Ordering::Release);

        let listeners = self.shared.listeners.load();
        if listeners.is_empty() {
            return;
        }
        dispatch_to(
            &self.shared.root.inner,
            &listeners,
            FlavorKind::Value,
            0,
            Some(dispatch),
            &self.shared.path,
        );
    }

    /// Register a value listener.
    ///
    /// With `send_on_add` the listener is called once right away, on the
    /// calling thread, with the current value. That call happens whatever
    /// `dispatch` is and is independent of later changes.
    pub fn add_value_listener(
        &self,
        listener: &mut ValueListener,
        send_on_add: bool,
        dispatch: DispatchType,
    ) -> Result<(), DispatchError> {
        let flavor = listener.flavor();
        let reg = listener.base.register(
            &self.shared.root,
            dispatch,
            flavor,
            SourceLink::Automation(Arc::downgrade(&self.shared)),
        )?;
        self.shared.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&reg));
            next
        });

        if send_on_add {
            reg.deliver(ChangedSlots::Single(0));
        }
        Ok(())
    }

    /// Deregister a value listener added to this source.
    pub fn remove_value_listener(&self, listener: &mut ValueListener) -> Result<(), DispatchError> {
        let ours = listener
            .base
            .registration()
            .is_some_and(|reg| reg.is_on_automation(&self.shared));
        if !ours {
            return Err(DispatchError::NotRegistered);
        }
        listener.base.clear_from_root();
        Ok(())
    }

    /// Number of registered value listeners.
    pub fn num_listeners(&self) -> usize {
        self.shared.listeners.load().len()
    }
}

impl fmt::Debug for CustomAutomationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAutomationSource")
            .field("index", &self.index())
            .field("name", &self.name())
            .field("value", &self.value())
            .finish_non_exhaustive()
    }
}

/// Listens to the value of one automation source.
///
/// The callback receives the source index and its value at delivery time.
pub struct ValueListener {
    base: ListenerBase,
    callback: Arc<CallbackCell<ValueFn>>,
}

impl ValueListener {
    /// Create an unregistered listener.
    pub fn new<F>(root: &RootObject, owner: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(usize, f32) + Send + 'static,
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

    /// Whether a live registration exists.
    pub fn is_registered(&self) -> bool {
        self.base.is_registered()
    }

    /// Deregister. See [`ListenerBase::clear_from_root`].
    pub fn clear_from_root(&mut self) {
        self.base.clear_from_root();
    }

    fn flavor(&self) -> Flavor {
        Flavor::Value(Arc::clone(&self.callback))
    }
}

impl fmt::Debug for ValueListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueListener").field(&self.base).finish()
    }
}

/// The ordered set of automation sources of one root.
pub struct CustomAutomationManager {
    root: RootObject,
    sources: RwLock<Vec<CustomAutomationSource>>,
}

impl CustomAutomationManager {
    /// Create an empty manager.
    pub fn new(root: &RootObject) -> Self {
        Self {
            root: root.clone(),
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Append a source. Its index is the number of sources before it.
    pub fn add_source(
        &self,
        name: &str,
        initial: f32,
    ) -> Result<CustomAutomationSource, DispatchError> {
        validate_segment(name)?;
        if name == "*" {
            return Err(DispatchError::invalid_path(name, "source name cannot be '*'"));
        }

        let mut sources = self.sources.write();
        if sources.iter().any(|s| s.name() == name) {
            return Err(DispatchError::DuplicateSource(name.to_string()));
        }

        let path = self
            .root
            .automation_root()
            .child(name)
            .child(FlavorKind::Value.path_segment());
        let source = CustomAutomationSource {
            shared: Arc::new(AutomationShared {
                key: self.root.inner.next_key(),
                index: sources.len(),
                name: name.to_string(),
                path,
                value: AtomicU32::new(initial.to_bits()),
                root: self.root.clone(),
                listeners: ArcSwap::from_pointee(Vec::new()),
            }),
        };
        self.root.inner.register_automation(&source.shared);
        sources.push(source.clone());

        #[cfg(feature = "tracing")]
        tracing::debug!(name, index = source.index(), initial, "automation source added");

        Ok(source)
    }

    /// Source at `index`.
    pub fn source(&self, index: usize) -> Option<CustomAutomationSource> {
        self.sources.read().get(index).cloned()
    }

    /// Source called `name`.
    pub fn source_by_name(&self, name: &str) -> Result<CustomAutomationSource, DispatchError> {
        self.sources
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownSource(name.to_string()))
    }

    /// Index of the source called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.sources.read().iter().position(|s| s.name() == name)
    }

    /// Set the value of the source at `index`. Returns `false` if there is
    /// no such source.
    pub fn set_value(&self, index: usize, value: f32, dispatch: DispatchType) -> bool {
        match self.source(index) {
            Some(source) => {
                source.set_value(value, dispatch);
                true
            }
            None => false,
        }
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Whether there are no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// Source names in index order.
    pub fn names(&self) -> Vec<String> {
        self.sources
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Remove every source. Listeners on sources no longer referenced
    /// elsewhere are deregistered.
    pub fn clear(&self) {
        self.sources.write().clear();
    }
}

impl fmt::Debug for CustomAutomationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAutomationManager")
            .field("sources", &self.names())
            .finish()
    }
}
