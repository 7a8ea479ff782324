//! Patchcord Core - real-time safe attribute-change dispatch
//!
//! This crate reports *that* something about a processor changed to the
//! parts of a host that care (editors, scripts, loaders) without letting
//! the audio thread block, allocate or call into UI code.
//!
//! # Core Abstractions
//!
//! ## Entities
//!
//! - [`RootObject`] - One per graph: registry, queues, suspension, flushing
//! - [`Processor`] - Entity with an id, colour, bypass flag and N attribute slots
//! - [`CustomAutomationSource`] / [`CustomAutomationManager`] - Standalone float values
//!
//! ## Listeners
//!
//! - [`AttributeListener`] - Changes of selected attribute slots
//! - [`NameAndColourListener`] - Renames and recolours
//! - [`OtherChangeListener`] - [`ProcessorChangeEvent`]s, filtered by kind
//! - [`BypassListener`] - Bypass toggles
//! - [`ValueListener`] - Automation values
//!
//! ## Delivery
//!
//! - [`DispatchType`] - `Sync`, `Async` or `AsyncHighPriority`
//! - [`DispatchThread`] - Which thread's flush delivers an async callback
//! - [`SlotBitmap`] - Growable bitset that coalesces changed slots
//! - [`HashedPath`] / [`SuspensionTree`] - Pause and resume sub-trees by dotted path
//!
//! # Example
//!
//! ```rust
//! use patchcord_core::{
//!     AttributeListener, DispatchThread, DispatchType, Processor, RootObject,
//! };
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let root = RootObject::new();
//! let reverb = Processor::with_attributes(&root, "reverb", 8).unwrap();
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let c = Arc::clone(&calls);
//! let mut knob = AttributeListener::new(&root, "room-size-knob", move |_, _| {
//!     c.fetch_add(1, Ordering::Relaxed);
//! });
//! reverb
//!     .add_attribute_listener(&mut knob, &[2], DispatchType::Async)
//!     .unwrap();
//!
//! // Audio thread: 64 automation steps in one block
//! for i in 0..64 {
//!     reverb.set_attribute(2, i as f32 / 64.0, DispatchType::Async);
//! }
//!
//! // UI timer: one callback for the whole burst
//! root.flush_queues(DispatchThread::Ui);
//! assert_eq!(calls.load(Ordering::Relaxed), 1);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe producers**: async dispatch is a `fetch_or` plus, once
//!   per listener between flushes, a lock-free queue push
//! - **Coalescing**: any number of async changes yields one callback per flush
//! - **Explicit lifetimes**: listeners deregister on drop; removed listeners
//!   are never called again
//! - **Suspension drops, resume catches up**: paused events are not queued,
//!   each affected listener gets exactly one notification on resume

pub mod automation;
pub mod bitmap;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod path;
pub mod processor;
pub mod queue;
pub mod root;
pub mod suspension;

// Re-export main types at crate root
pub use automation::{CustomAutomationManager, CustomAutomationSource, ValueListener};
pub use bitmap::{BLOCK_BITS, DEFAULT_CEILING, MAX_CEILING, SetBits, SlotBitmap};
pub use dispatch::{DispatchThread, DispatchType, QueuePriority};
pub use error::DispatchError;
pub use listener::{
    AttributeListener, BypassListener, ChangedSlots, ChangedSlotsIter, ListenerBase,
    NameAndColourListener, OtherChangeListener,
};
pub use path::{HashedPath, Segment, hash_segment, validate_segment};
pub use processor::{Colour, Processor, ProcessorChangeEvent, ProcessorRef};
pub use queue::FlushStats;
pub use root::{DEFAULT_SLOT_CEILING, DispatchStats, RootConfig, RootObject};
pub use suspension::{SuspensionState, SuspensionTree};
