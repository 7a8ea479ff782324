//! Configuration for patchcord dispatch roots.
//!
//! Describes a [`RootObject`](patchcord_core::RootObject) in a TOML file:
//! bitmap ceiling, queue capacity, suspension path roots, the host's flush
//! cadence, and paths to pause at startup.
//!
//! # Features
//!
//! - **Config files**: Load and save [`DispatchConfig`] as TOML
//! - **Validation**: Collect every problem before a root is built
//! - **Paths**: Platform-specific config directory
//!
//! # Example
//!
//! ```rust
//! use patchcord_config::{DispatchConfig, SuspensionConfig};
//!
//! let config = DispatchConfig::from_toml(
//!     r#"
//!     [queues]
//!     capacity = 256
//!
//!     [[suspensions]]
//!     path = "modules.*.bypass"
//!     "#,
//! )
//! .unwrap();
//!
//! let root = config.build_root().unwrap();
//! assert_eq!(root.config().queue_capacity, 256);
//! assert_eq!(root.suspension().paused_paths().len(), 1);
//! ```

mod config;
mod error;

/// Platform-specific paths for configuration.
pub mod paths;

/// Configuration validation.
pub mod validation;

pub use config::{
    BitmapConfig, DispatchConfig, PathConfig, PathState, QueueConfig, SuspensionConfig,
    TimerConfig,
};
pub use error::ConfigError;
pub use paths::{default_config_path, ensure_user_config_dir, find_config, user_config_dir};
pub use validation::{ValidationError, ValidationResult, validate_config, validate_root};
