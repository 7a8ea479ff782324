//! Pause/resume state for sub-trees of the entity hierarchy.
//!
//! The tree is written rarely (while bulk-editing state) and read on every
//! dispatch, possibly from the audio thread. Writers serialize on a mutex and
//! publish an immutable snapshot of the paused patterns through `ArcSwap`;
//! readers load the snapshot without locking. When nothing is paused the
//! read is a single atomic load.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::path::HashedPath;

/// Delivery state of a suspension path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SuspensionState {
    /// Events flow normally.
    #[default]
    Running,
    /// Events for matching entities are dropped.
    Paused,
}

/// The set of currently paused path patterns.
///
/// A target path is suspended when any paused pattern matches it, so a
/// specific pattern (`modules.synth1.attribute`) and a broad one
/// (`modules.*`) pause the same stream independently.
pub struct SuspensionTree {
    paused: ArcSwap<Vec<HashedPath>>,
    num_paused: AtomicUsize,
    writer: Mutex<()>,
}

impl SuspensionTree {
    /// Create a tree with nothing paused.
    pub fn new() -> Self {
        Self {
            paused: ArcSwap::from_pointee(Vec::new()),
            num_paused: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Set the state of one pattern. Returns `true` if anything changed.
    ///
    /// Patterns are compared exactly: resuming `modules.*` only undoes a
    /// pause of `modules.*`, not of `modules.synth1`.
    pub fn set_state(&self, path: &HashedPath, state: SuspensionState) -> bool {
        let _guard = self.writer.lock();
        let current = self.paused.load_full();
        let present = current.iter().any(|p| p == path);

        let next: Vec<HashedPath> = match (state, present) {
            (SuspensionState::Paused, false) => {
                let mut next = Vec::clone(&current);
                next.push(path.clone());
                next
            }
            (SuspensionState::Running, true) => {
                current.iter().filter(|p| *p != path).cloned().collect()
            }
            _ => return false,
        };

        self.num_paused.store(next.len(), Ordering::Release);
        self.paused.store(Arc::new(next));
        true
    }

    /// State of one pattern as last set.
    pub fn state(&self, path: &HashedPath) -> SuspensionState {
        if self.paused.load().iter().any(|p| p == path) {
            SuspensionState::Paused
        } else {
            SuspensionState::Running
        }
    }

    /// Whether `target` is matched by any paused pattern. Lock-free.
    #[inline]
    pub fn is_suspended(&self, target: &HashedPath) -> bool {
        if self.num_paused.load(Ordering::Acquire) == 0 {
            return false;
        }
        self.paused.load().iter().any(|p| p.matches(target))
    }

    /// Whether anything at all is paused.
    #[inline]
    pub fn any_paused(&self) -> bool {
        self.num_paused.load(Ordering::Acquire) != 0
    }

    /// Snapshot of the paused patterns.
    pub fn paused_paths(&self) -> Vec<HashedPath> {
        Vec::clone(&self.paused.load())
    }
}

impl Default for SuspensionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SuspensionTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SuspensionTree")
            .field("paused", &*self.paused.load())
            .finish()
    }
}
