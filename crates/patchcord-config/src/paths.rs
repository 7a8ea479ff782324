//! Platform-specific paths for dispatch configuration.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/patchcord/` (Linux), `~/Library/Application Support/patchcord/` (macOS), `%APPDATA%\patchcord\` (Windows)
//! - **Default file**: `patchcord.toml` inside the user config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use patchcord_config::paths;
//!
//! let path = paths::default_config_path();
//! println!("Config: {:?}", path);
//!
//! if let Some(found) = paths::find_config("live-rig") {
//!     println!("Found config at: {:?}", found);
//! }
//! ```

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "patchcord";

/// File name of the default configuration.
pub const DEFAULT_CONFIG_FILE: &str = "patchcord.toml";

/// Returns the user-specific configuration directory.
///
/// # Platform Paths
///
/// - Linux: `~/.config/patchcord/`
/// - macOS: `~/Library/Application Support/patchcord/`
/// - Windows: `%APPDATA%\patchcord\`
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the default configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(DEFAULT_CONFIG_FILE)
}

/// Find a configuration file by name.
///
/// Searches in the following order:
/// 1. `name` itself, if it is an existing file
/// 2. The user config directory, adding `.toml` if missing
pub fn find_config(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{}.toml", name)
    };

    let user_path = user_config_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}
