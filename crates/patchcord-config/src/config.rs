//! Dispatch configuration file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use patchcord_core::{HashedPath, RootConfig, RootObject, SuspensionState};

use crate::error::ConfigError;
use crate::validation::{ValidationResult, validate_config};

/// Configuration of one dispatch root.
///
/// Stored as TOML. Every section is optional and falls back to the
/// defaults shown here.
///
/// # TOML Format
///
/// ```toml
/// name = "live-rig"
///
/// [bitmap]
/// ceiling = 8192
///
/// [queues]
/// capacity = 1024
///
/// [paths]
/// processor_root = "modules"
/// automation_root = "automation"
///
/// [timer]
/// flush_interval_ms = 30
/// high_priority_interval_ms = 5
///
/// [[suspensions]]
/// path = "modules.*.bypass"
/// state = "paused"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DispatchConfig {
    /// Optional label for logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Slot bitmap sizing.
    #[serde(default)]
    pub bitmap: BitmapConfig,

    /// Key queue sizing.
    #[serde(default)]
    pub queues: QueueConfig,

    /// Suspension path roots.
    #[serde(default)]
    pub paths: PathConfig,

    /// Flush timer cadence for the host.
    #[serde(default)]
    pub timer: TimerConfig,

    /// Paths to pause (or resume) when the root is built.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suspensions: Vec<SuspensionConfig>,
}

/// `[bitmap]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BitmapConfig {
    /// Highest attribute slot a listener may register for, plus one, in
    /// bits. A multiple of 32.
    #[serde(default = "default_ceiling")]
    pub ceiling: usize,
}

impl Default for BitmapConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
        }
    }
}

fn default_ceiling() -> usize {
    RootConfig::default().bitmap_ceiling
}

/// `[queues]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Capacity of each key queue. Overflow degrades to a registry scan.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    RootConfig::default().queue_capacity
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathConfig {
    /// Prefix of processor paths.
    #[serde(default = "default_processor_root")]
    pub processor_root: String,

    /// Prefix of automation paths.
    #[serde(default = "default_automation_root")]
    pub automation_root: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            processor_root: default_processor_root(),
            automation_root: default_automation_root(),
        }
    }
}

fn default_processor_root() -> String {
    RootConfig::default().processor_root
}

fn default_automation_root() -> String {
    RootConfig::default().automation_root
}

/// `[timer]` section.
///
/// The dispatcher owns no threads; these are the intervals the host should
/// call `flush_queues` and `flush_high_priority_queues` at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerConfig {
    /// Interval of the full flush.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Interval of the high-priority flush.
    #[serde(default = "default_high_priority_interval")]
    pub high_priority_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval(),
            high_priority_interval_ms: default_high_priority_interval(),
        }
    }
}

fn default_flush_interval() -> u64 {
    30
}

fn default_high_priority_interval() -> u64 {
    5
}

impl TimerConfig {
    /// Full flush interval.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// High-priority flush interval.
    pub fn high_priority_interval(&self) -> Duration {
        Duration::from_millis(self.high_priority_interval_ms)
    }
}

/// One `[[suspensions]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuspensionConfig {
    /// Dotted path pattern, `*` allowed.
    pub path: String,

    /// State to apply. Defaults to paused.
    #[serde(default)]
    pub state: PathState,
}

impl SuspensionConfig {
    /// A paused entry for `path`.
    pub fn paused(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: PathState::Paused,
        }
    }
}

/// Serialized form of [`SuspensionState`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathState {
    /// Events are dropped.
    #[default]
    Paused,
    /// Events flow.
    Running,
}

impl From<PathState> for SuspensionState {
    fn from(state: PathState) -> Self {
        match state {
            PathState::Paused => SuspensionState::Paused,
            PathState::Running => SuspensionState::Running,
        }
    }
}

impl DispatchConfig {
    /// Create a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the bitmap ceiling.
    pub fn with_bitmap_ceiling(mut self, ceiling: usize) -> Self {
        self.bitmap.ceiling = ceiling;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queues.capacity = capacity;
        self
    }

    /// Add a suspension entry.
    pub fn with_suspension(mut self, suspension: SuspensionConfig) -> Self {
        self.suspensions.push(suspension);
        self
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config: DispatchConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded dispatch config");
        Ok(config)
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::debug!(path = %path.display(), "saved dispatch config");
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every field.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_config(self)
    }

    /// Root construction parameters.
    pub fn root_config(&self) -> RootConfig {
        RootConfig {
            bitmap_ceiling: self.bitmap.ceiling,
            queue_capacity: self.queues.capacity,
            processor_root: self.paths.processor_root.clone(),
            automation_root: self.paths.automation_root.clone(),
        }
    }

    /// Validate, build a root and apply the configured suspensions in order.
    pub fn build_root(&self) -> Result<RootObject, ConfigError> {
        self.validate()?;
        let root = RootObject::with_config(self.root_config())?;
        for entry in &self.suspensions {
            let path = HashedPath::parse(&entry.path)?;
            root.set_state(&path, entry.state.into());
        }
        tracing::info!(
            name = self.name.as_deref().unwrap_or("unnamed"),
            suspensions = self.suspensions.len(),
            "dispatch root ready"
        );
        Ok(root)
    }
}
