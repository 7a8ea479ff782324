//! Suspension pattern evaluation.
//!
//! Answers "would pausing PATTERN silence TARGET?" using the same prefix and
//! wildcard rules the dispatcher applies.

use clap::Args;
use patchcord_core::{HashedPath, Segment};
use serde::Serialize;

#[derive(Args)]
pub struct MatchPathArgs {
    /// Suspension pattern (e.g., "modules.*.bypass")
    pattern: String,

    /// Event paths to test against the pattern
    #[arg(required = true)]
    targets: Vec<String>,

    /// Print the hash of every segment
    #[arg(long)]
    hashes: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct MatchReport {
    pattern: String,
    wildcard: bool,
    results: Vec<TargetResult>,
}

#[derive(Serialize)]
struct TargetResult {
    target: String,
    matches: bool,
}

pub fn run(args: MatchPathArgs) -> anyhow::Result<()> {
    let pattern = HashedPath::parse(&args.pattern)?;

    let mut results = Vec::with_capacity(args.targets.len());
    for text in &args.targets {
        let target = HashedPath::parse(text)?;
        results.push(TargetResult {
            target: text.clone(),
            matches: pattern.matches(&target),
        });
    }

    let report = MatchReport {
        pattern: args.pattern.clone(),
        wildcard: pattern.has_wildcard(),
        results,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Pattern: {} ({} segment{}{})",
        report.pattern,
        pattern.len(),
        if pattern.len() == 1 { "" } else { "s" },
        if report.wildcard { ", wildcard" } else { "" }
    );
    if args.hashes {
        print_hashes(&pattern);
    }
    println!();

    let width = report
        .results
        .iter()
        .map(|r| r.target.len())
        .max()
        .unwrap_or(0);
    for result in &report.results {
        let verdict = if result.matches { "paused" } else { "running" };
        println!("  {:width$}  {}", result.target, verdict, width = width);
    }

    Ok(())
}

fn print_hashes(path: &HashedPath) {
    for (text, segment) in path.as_str().split('.').zip(path.segments()) {
        match segment {
            Segment::Wildcard => println!("    {:16} *", text),
            Segment::Hashed(hash) => println!("    {:16} {:#010x}", text, hash),
        }
    }
}
