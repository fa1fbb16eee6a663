//! `report`: offline summaries of recorded debugloop runs.

mod cli;
mod commands;
mod conversation;
mod diffs;
mod errors;
mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "report", version, about = "Summarize recorded debugloop runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn and function counts per run, totals and success rate per segment.
    Summary { dir: PathBuf },
    /// Debugger command and subcommand counts across all runs.
    Commands { dir: PathBuf },
    /// Failed debugger command messages, grouped and most frequent first.
    Errors {
        dir: PathBuf,
        /// Extra grouping rule `substring=key`; checked before the built-in rules.
        #[arg(long = "group", value_name = "SUBSTRING=KEY")]
        groups: Vec<String>,
    },
    /// Source diff from the start commit to the final commit of each run.
    Diffs { dir: PathBuf },
}

fn main() -> Result<()> {
    debugloop::logging::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Summary { dir } => cli::summary(&dir),
        Command::Commands { dir } => cli::commands(&dir),
        Command::Errors { dir, groups } => cli::errors(&dir, &groups),
        Command::Diffs { dir } => cli::diffs(&dir),
    }
}
