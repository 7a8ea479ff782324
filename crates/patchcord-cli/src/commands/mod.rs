//! CLI command implementations.

pub mod config;
pub mod match_path;
pub mod simulate;
