//! `debugloop`: let a decision service debug and repair a crashing program.
//!
//! `init` scaffolds `.debugloop/` in the working directory; `run` launches the
//! program under gdb and drives the repair loop until a terminal state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use debugloop::exit_codes;
use debugloop::io::build::ProcessBuildRunner;
use debugloop::io::config::load_config;
use debugloop::io::debugger::gdb::{GdbLaunch, GdbSession};
use debugloop::io::init::{DriverPaths, InitOptions, init_driver};
use debugloop::io::service::ChatCompletionsService;
use debugloop::logging;
use debugloop::session::{
    LoopStop, RunRequest, restore_resume_point, run_session, start_session,
};

#[derive(Parser)]
#[command(
    name = "debugloop",
    version,
    about = "Debug and repair a program with a tool-calling decision service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.debugloop/` with a default `config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        /// Working directory (defaults to the current directory).
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
    /// Launch the executable under gdb and run the repair loop.
    Run {
        /// Program to debug, relative to the working directory.
        #[arg(long)]
        executable: PathBuf,
        /// Snapshot id or run id whose decisions are replayed first.
        #[arg(long)]
        resume: Option<String>,
        /// Config file (defaults to `.debugloop/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Working directory (defaults to the current directory).
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Arguments passed to the program.
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, workdir } => cmd_init(&resolve_workdir(workdir)?, force),
        Command::Run {
            executable,
            resume,
            config,
            workdir,
            args,
        } => cmd_run(
            &resolve_workdir(workdir)?,
            &executable,
            config,
            resume,
            RunRequest {
                executable: executable.display().to_string(),
                args,
                resume: None,
            },
        ),
    }
}

fn resolve_workdir(workdir: Option<PathBuf>) -> Result<PathBuf> {
    match workdir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("read current directory"),
    }
}

fn cmd_init(workdir: &Path, force: bool) -> Result<i32> {
    let paths = init_driver(workdir, &InitOptions { force })?;
    println!("wrote {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    workdir: &Path,
    executable: &Path,
    config_path: Option<PathBuf>,
    resume: Option<String>,
    mut request: RunRequest,
) -> Result<i32> {
    let config_path = config_path.unwrap_or_else(|| DriverPaths::new(workdir).config_path);
    let config = load_config(&config_path)?;
    let builder = ProcessBuildRunner;
    let mut setup = start_session(workdir, config, &builder)?;
    if let Some(id) = resume {
        request.resume = Some(restore_resume_point(&mut setup, &id)?);
    }
    let service = ChatCompletionsService::from_config(&setup.config.service)?;

    let debugger_cfg = &setup.config.debugger;
    let mut debugger = GdbSession::launch(GdbLaunch {
        program: debugger_cfg.program.clone(),
        executable: workdir.join(executable),
        args: request.args.clone(),
        workdir: workdir.to_path_buf(),
        pause_at_start: debugger_cfg.pause_at_start,
        entry_function: debugger_cfg.entry_function.clone(),
        command_timeout: Duration::from_secs(debugger_cfg.command_timeout_secs),
    })?;

    eprintln!("run {}", setup.run_id);
    let outcome = run_session(&setup, &request, &service, &mut debugger, &builder, |meta| {
        let kinds: Vec<&str> = meta.intents.iter().map(|i| i.kind.as_str()).collect();
        eprintln!("turn {}: {}", meta.turn, kinds.join(", "));
    })?;

    match &outcome.stop {
        LoopStop::Exited { code } => println!("process exited with status {code}"),
        LoopStop::GaveUp => println!("gave up"),
        LoopStop::MaxTurnsExceeded { max_turns } => println!("turn limit ({max_turns}) reached"),
    }
    Ok(exit_codes::for_stop(&outcome.stop))
}
