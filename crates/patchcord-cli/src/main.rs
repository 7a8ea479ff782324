//! Patchcord CLI - host driver for patchcord dispatch roots.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchcord")]
#[command(author, version, about = "Patchcord attribute-change dispatch CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an audio-thread / UI-thread dispatch simulation
    Simulate(commands::simulate::SimulateArgs),

    /// Check which targets a suspension pattern covers
    MatchPath(commands::match_path::MatchPathArgs),

    /// Create, show and validate configuration files
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so JSON reports on stdout stay parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::MatchPath(args) => commands::match_path::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
