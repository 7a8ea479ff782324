//! Error types for dispatcher operations.

use thiserror::Error;

/// Errors reported by the dispatcher's registration and addressing APIs.
///
/// The real-time producer path (`set_attribute`, `set_value`) never returns
/// these; it either dispatches or drops. Everything here comes from
/// authoring-time calls made on a UI or setup thread.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// A bit index at or past a bitmap's ceiling.
    #[error("slot {index} is out of range for a bitmap with a ceiling of {ceiling} bits")]
    OutOfRange {
        /// Requested bit index.
        index: usize,
        /// Number of addressable bits.
        ceiling: usize,
    },

    /// A listener asked for an attribute the processor does not have.
    #[error("attribute {slot} is out of range for processor '{processor}' ({count} attributes)")]
    AttributeOutOfRange {
        /// Id of the processor at registration time.
        processor: String,
        /// Requested attribute slot.
        slot: usize,
        /// Configured attribute count.
        count: usize,
    },

    /// The listener already has a live registration.
    #[error("listener is already registered")]
    AlreadyRegistered,

    /// The listener has no registration on this source.
    #[error("listener is not registered on this source")]
    NotRegistered,

    /// A dotted path or path segment could not be parsed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending text.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No automation source with this name exists.
    #[error("unknown automation source: {0}")]
    UnknownSource(String),

    /// An automation source with this name already exists.
    #[error("duplicate automation source: {0}")]
    DuplicateSource(String),

    /// The listener and the source were created against different roots.
    #[error("listener and source belong to different root objects")]
    ForeignRoot,
}

impl DispatchError {
    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        DispatchError::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}
