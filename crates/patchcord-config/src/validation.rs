//! Validation of dispatch configuration.
//!
//! Checks every field of a [`DispatchConfig`] before a root is built from
//! it, collecting all problems instead of stopping at the first.
//!
//! # Example
//!
//! ```rust
//! use patchcord_config::{DispatchConfig, validate_config};
//!
//! let config = DispatchConfig::default();
//! validate_config(&config).expect("defaults are valid");
//! ```

use thiserror::Error;

use patchcord_core::{BLOCK_BITS, HashedPath};

use crate::config::DispatchConfig;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Bitmap ceiling of zero.
    #[error("bitmap ceiling must be greater than zero")]
    ZeroCeiling,

    /// Bitmap ceiling not a whole number of blocks.
    #[error("bitmap ceiling {ceiling} is not a multiple of {block} bits")]
    UnalignedCeiling {
        /// Configured ceiling.
        ceiling: usize,
        /// Block size in bits.
        block: usize,
    },

    /// Queue capacity of zero.
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    /// A path root that cannot be used as a prefix.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidRoot {
        /// Which root.
        field: &'static str,
        /// The configured text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Processor and automation roots are the same.
    #[error("processor_root and automation_root must differ (both '{0}')")]
    SameRoots(String),

    /// A suspension entry with a malformed path.
    #[error("invalid suspension path '{path}': {reason}")]
    InvalidSuspension {
        /// The configured path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A timer interval of zero.
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// The high-priority timer fires less often than the normal one.
    #[error(
        "high_priority_interval_ms ({high_priority_ms}) must not exceed flush_interval_ms ({flush_ms})"
    )]
    SlowHighPriority {
        /// High-priority interval.
        high_priority_ms: u64,
        /// Normal interval.
        flush_ms: u64,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a whole configuration.
///
/// Returns the single error if there is one, [`ValidationError::Multiple`]
/// if there are several.
pub fn validate_config(config: &DispatchConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();

    let ceiling = config.bitmap.ceiling;
    if ceiling == 0 {
        errors.push(ValidationError::ZeroCeiling);
    } else if ceiling % BLOCK_BITS != 0 {
        errors.push(ValidationError::UnalignedCeiling {
            ceiling,
            block: BLOCK_BITS,
        });
    }

    if config.queues.capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }

    let processor_root = validate_root("processor_root", &config.paths.processor_root);
    let automation_root = validate_root("automation_root", &config.paths.automation_root);
    match (processor_root, automation_root) {
        (Ok(p), Ok(a)) if p == a => {
            errors.push(ValidationError::SameRoots(config.paths.processor_root.clone()));
        }
        (p, a) => errors.extend(p.err().into_iter().chain(a.err())),
    }

    for entry in &config.suspensions {
        if let Err(e) = HashedPath::parse(&entry.path) {
            errors.push(ValidationError::InvalidSuspension {
                path: entry.path.clone(),
                reason: e.to_string(),
            });
        }
    }

    let timer = &config.timer;
    if timer.flush_interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval("flush_interval_ms"));
    }
    if timer.high_priority_interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval("high_priority_interval_ms"));
    }
    if timer.high_priority_interval_ms > timer.flush_interval_ms && timer.flush_interval_ms > 0 {
        errors.push(ValidationError::SlowHighPriority {
            high_priority_ms: timer.high_priority_interval_ms,
            flush_ms: timer.flush_interval_ms,
        });
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Validate a path root: a parseable dotted path without wildcards.
pub fn validate_root(field: &'static str, value: &str) -> ValidationResult<HashedPath> {
    let path = HashedPath::parse(value).map_err(|e| ValidationError::InvalidRoot {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if path.has_wildcard() {
        return Err(ValidationError::InvalidRoot {
            field,
            value: value.to_string(),
            reason: "wildcards are not allowed in a root".to_string(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathState, SuspensionConfig};

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&DispatchConfig::default()), Ok(()));
    }

    #[test]
    fn zero_and_unaligned_ceiling() {
        let mut config = DispatchConfig::default();
        config.bitmap.ceiling = 0;
        assert_eq!(validate_config(&config), Err(ValidationError::ZeroCeiling));

        config.bitmap.ceiling = 40;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::UnalignedCeiling {
                ceiling: 40,
                block: 32
            })
        );

        config.bitmap.ceiling = 4128;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn zero_capacity() {
        let mut config = DispatchConfig::default();
        config.queues.capacity = 0;
        assert_eq!(validate_config(&config), Err(ValidationError::ZeroCapacity));
    }

    #[test]
    fn bad_roots() {
        let mut config = DispatchConfig::default();
        config.paths.processor_root = "modules.*".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidRoot {
                field: "processor_root",
                ..
            })
        ));

        config.paths.processor_root = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn identical_roots() {
        let mut config = DispatchConfig::default();
        config.paths.automation_root = "modules".to_string();
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::SameRoots("modules".to_string()))
        );
    }

    #[test]
    fn malformed_suspension_path() {
        let mut config = DispatchConfig::default();
        config.suspensions.push(SuspensionConfig {
            path: "modules..x".to_string(),
            state: PathState::Paused,
        });
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidSuspension { ref path, .. }) if path == "modules..x"
        ));
    }

    #[test]
    fn timer_rules() {
        let mut config = DispatchConfig::default();
        config.timer.high_priority_interval_ms = 50;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::SlowHighPriority {
                high_priority_ms: 50,
                flush_ms: 30
            })
        );

        config.timer.flush_interval_ms = 0;
        config.timer.high_priority_interval_ms = 0;
        match validate_config(&config) {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected two errors, got {other:?}"),
        }
    }

    #[test]
    fn multiple_errors_are_joined() {
        let mut config = DispatchConfig::default();
        config.bitmap.ceiling = 0;
        config.queues.capacity = 0;
        let err = validate_config(&config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bitmap ceiling"), "got: {msg}");
        assert!(msg.contains("queue capacity"), "got: {msg}");
    }
}
