//! Configuration file commands.
//!
//! Writes a default configuration, prints and validates existing ones, and
//! shows where configuration files are looked up.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use patchcord_config::{
    DispatchConfig, default_config_path, ensure_user_config_dir, find_config, user_config_dir,
};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a configuration file with every default filled in
    Init {
        /// Output path (default: user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print a configuration as TOML
    Show {
        /// Config name or path (default: built-in defaults)
        name: Option<String>,
    },

    /// Check a configuration file for errors
    Validate {
        /// Config name or path
        name: String,
    },

    /// Show configuration paths
    Paths,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Init { path, force } => init_config(path, force),
        ConfigCommand::Show { name } => show_config(name.as_deref()),
        ConfigCommand::Validate { name } => validate(&name),
        ConfigCommand::Paths => show_paths(),
    }
}

/// Resolve a config name or path and load it.
pub fn load_config(name: &str) -> anyhow::Result<(PathBuf, DispatchConfig)> {
    let path = find_config(name).with_context(|| format!("config '{}' not found", name))?;
    let config = DispatchConfig::load(&path)?;
    Ok((path, config))
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            ensure_user_config_dir()?;
            default_config_path()
        }
    };

    if path.exists() && !force {
        anyhow::bail!(
            "'{}' already exists. Use --force to overwrite.",
            path.display()
        );
    }

    DispatchConfig::new().save(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn show_config(name: Option<&str>) -> anyhow::Result<()> {
    let config = match name {
        Some(name) => {
            let (path, config) = load_config(name)?;
            println!("# {}", path.display());
            config
        }
        None => DispatchConfig::new(),
    };

    print!("{}", config.to_toml()?);
    Ok(())
}

fn validate(name: &str) -> anyhow::Result<()> {
    let (path, config) = load_config(name)?;
    config
        .validate()
        .with_context(|| format!("{} is invalid", path.display()))?;

    print_summary(&path, &config);
    Ok(())
}

fn print_summary(path: &Path, config: &DispatchConfig) {
    println!("{}: valid", path.display());
    if let Some(name) = &config.name {
        println!("  name:            {}", name);
    }
    println!("  bitmap ceiling:  {} bits", config.bitmap.ceiling);
    println!("  queue capacity:  {}", config.queues.capacity);
    println!(
        "  roots:           {} / {}",
        config.paths.processor_root, config.paths.automation_root
    );
    println!(
        "  flush timer:     {} ms (high priority {} ms)",
        config.timer.flush_interval_ms, config.timer.high_priority_interval_ms
    );
    println!("  suspensions:     {}", config.suspensions.len());
}

fn show_paths() -> anyhow::Result<()> {
    println!("Configuration Paths:");
    println!("====================");
    println!();
    println!("User config dir: {}", user_config_dir().display());
    println!("Default config:  {}", default_config_path().display());
    Ok(())
}
