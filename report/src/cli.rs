//! CLI command implementations.

use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use crate::commands::CommandCounts;
use crate::conversation::load_run_logs;
use crate::diffs::load_run_diffs;
use crate::errors::{ErrorCounts, ErrorGroups};
use crate::summary::{group_by_segment, summarize_run};

/// Print per-run counts and per-segment totals for the logs below `dir`.
pub fn summary(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let (logs, warnings) = load_run_logs(dir)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    info!(runs = logs.len(), "summarizing");

    let runs: Vec<_> = logs.iter().map(summarize_run).collect();
    for run in &runs {
        println!(
            "run: dir={} segment={} success={} {} {}",
            run.dir.display(),
            run.segment,
            run.success,
            format_counts(run.roles.iter().map(|(k, v)| (*k, *v))),
            format_counts(run.functions.iter().map(|(k, v)| (k.as_str(), *v))),
        );
    }
    for (segment, totals) in group_by_segment(&runs) {
        println!(
            "segment: {} runs={} succeeded={} success_rate={:.2} {} {}",
            segment,
            totals.runs,
            totals.successes,
            totals.success_rate(),
            format_counts(totals.roles.iter().map(|(k, v)| (*k, *v))),
            format_counts(totals.functions.iter().map(|(k, v)| (k.as_str(), *v))),
        );
    }
    Ok(())
}

/// Print debugger command and subcommand counts for the logs below `dir`.
pub fn commands(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let (logs, warnings) = load_run_logs(dir)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    let mut counts = CommandCounts::default();
    for log in &logs {
        counts.add_turns(&log.turns);
    }
    for (cmd, count) in &counts.commands {
        println!("command: {cmd} {count}");
        let prefix = format!("{cmd} ");
        for (sub, sub_count) in counts.subcommands.range(prefix.clone()..) {
            if !sub.starts_with(&prefix) {
                break;
            }
            println!("  subcommand: {sub} {sub_count}");
        }
    }
    Ok(())
}

/// Print failed debugger command messages for the logs below `dir`.
pub fn errors(dir: &Path, groups: &[String]) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let groups = ErrorGroups::default().with_rules(groups)?;
    let (logs, warnings) = load_run_logs(dir)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    let mut counts = ErrorCounts::default();
    for log in &logs {
        counts.add_turns(&log.turns, &groups);
    }
    for (message, count) in counts.sorted() {
        println!("error: {count} {message}");
    }
    Ok(())
}

/// Print the source diff each finished run below `dir` produced.
pub fn diffs(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let (diffs, warnings) = load_run_diffs(dir)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    info!(runs = diffs.len(), "diffing");
    for run in &diffs {
        println!(
            "run: dir={} segment={} stop={}",
            run.run_dir.display(),
            run.segment,
            run.stop.as_deref().unwrap_or("unknown"),
        );
        if run.diff.is_empty() {
            println!("(no changes)");
        } else {
            print!("{}", run.diff);
        }
    }
    Ok(())
}

fn format_counts<'a>(counts: impl Iterator<Item = (&'a str, usize)>) -> String {
    counts
        .map(|(name, count)| format!("{name}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}
