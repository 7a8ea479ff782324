//! Integration tests for patchcord-config.
//!
//! These tests verify end-to-end functionality across modules: files on
//! disk, validation, and roots built from configuration.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use patchcord_config::{ConfigError, DispatchConfig, PathState, SuspensionConfig};
use patchcord_core::{
    AttributeListener, DispatchError, DispatchType, HashedPath, Processor, SuspensionState,
};
use tempfile::TempDir;

/// Save and load through a nested directory that does not exist yet.
#[test]
fn test_save_and_load_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("rig.toml");

    let config = DispatchConfig::new()
        .with_name("rig")
        .with_queue_capacity(128)
        .with_suspension(SuspensionConfig::paused("modules.*.bypass"));
    config.save(&path).unwrap();
    assert!(path.exists());

    let loaded = DispatchConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");
    let err = DispatchConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_load_malformed_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[queues\ncapacity = ").unwrap();
    assert!(matches!(
        DispatchConfig::load(&path),
        Err(ConfigError::TomlParse(_))
    ));
}

/// A root built from a file pauses what the file says and still dispatches
/// everything else.
#[test]
fn test_built_root_dispatches() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rig.toml");
    std::fs::write(
        &path,
        r#"
name = "rig"

[bitmap]
ceiling = 4128

[[suspensions]]
path = "modules.muted"
"#,
    )
    .unwrap();

    let root = DispatchConfig::load(&path).unwrap().build_root().unwrap();
    assert_eq!(root.config().bitmap_ceiling, 4128);
    assert!(root.new_bitmap().set_bit(4127, true).is_ok());

    let count = Arc::new(AtomicUsize::new(0));
    let muted = Processor::with_attributes(&root, "muted", 4).unwrap();
    let live = Processor::with_attributes(&root, "live", 4).unwrap();

    let c = Arc::clone(&count);
    let mut on_muted = AttributeListener::new(&root, "a", move |_, _| {
        c.fetch_add(1, Ordering::Relaxed);
    });
    let c = Arc::clone(&count);
    let mut on_live = AttributeListener::new(&root, "b", move |_, _| {
        c.fetch_add(1, Ordering::Relaxed);
    });
    muted
        .add_attribute_listener(&mut on_muted, &[0], DispatchType::Sync)
        .unwrap();
    live.add_attribute_listener(&mut on_live, &[0], DispatchType::Sync)
        .unwrap();

    muted.set_attribute(0, 1.0, DispatchType::Sync);
    live.set_attribute(0, 1.0, DispatchType::Sync);
    assert_eq!(count.load(Ordering::Relaxed), 1);

    let pattern = HashedPath::parse("modules.muted").unwrap();
    assert_eq!(root.state(&pattern), SuspensionState::Paused);
    root.set_state(&pattern, SuspensionState::Running);
    assert_eq!(count.load(Ordering::Relaxed), 2, "resume catch-up");
}

/// The configured ceiling bounds which slots a listener can register for.
#[test]
fn test_ceiling_bounds_listener_registration() {
    let config = DispatchConfig::from_toml("[bitmap]\nceiling = 64\n").unwrap();
    let root = config.build_root().unwrap();
    let processor = Processor::with_attributes(&root, "wide", 100).unwrap();
    let mut listener = AttributeListener::new(&root, "editor", |_, _| {});

    let err = processor
        .add_attribute_listener(&mut listener, &[70], DispatchType::Async)
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::OutOfRange {
            index: 70,
            ceiling: 64,
        }
    );
    processor
        .add_attribute_listener(&mut listener, &[63], DispatchType::Async)
        .unwrap();
}

/// Later entries override earlier ones for the same pattern.
#[test]
fn test_suspensions_apply_in_order() {
    let config = DispatchConfig::new()
        .with_suspension(SuspensionConfig::paused("modules.*"))
        .with_suspension(SuspensionConfig {
            path: "modules.*".to_string(),
            state: PathState::Running,
        });
    let root = config.build_root().unwrap();
    assert!(!root.suspension().any_paused());
}

#[test]
fn test_invalid_file_fails_to_build() {
    let config = DispatchConfig::from_toml(
        r#"
[paths]
processor_root = "same"
automation_root = "same"
"#,
    )
    .unwrap();
    let err = config.build_root().unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
    assert!(err.to_string().contains("must differ"), "got: {err}");
}
