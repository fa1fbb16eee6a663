//! [`DebuggerSession`] over `gdb --interpreter=mi2`.
//!
//! A reader thread turns gdb's stdout into [`MiRecord`]s and sends them over a
//! channel; the session blocks on that channel (with a timeout) whenever it
//! waits for a command result or for the program to stop.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use super::mi::{MiRecord, field, quote};
use super::{DebuggerSession, SessionReply};
use crate::core::error::{FatalLaunchError, SessionError};

/// Everything needed to (re)launch the debugged program.
#[derive(Debug, Clone)]
pub struct GdbLaunch {
    /// Debugger executable, usually `gdb`.
    pub program: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub pause_at_start: bool,
    pub entry_function: String,
    pub command_timeout: Duration,
}

struct ResultRecord {
    class: String,
    body: String,
    output: String,
}

pub struct GdbSession {
    launch: GdbLaunch,
    child: Child,
    stdin: ChildStdin,
    records: Receiver<MiRecord>,
    next_token: u64,
    last_stop: Option<String>,
    exited: bool,
    exit_code: Option<i32>,
}

impl GdbSession {
    /// Start gdb, load the program, run it and wait for the first stop.
    ///
    /// Any failure is a [`FatalLaunchError`].
    #[instrument(skip_all, fields(executable = %launch.executable.display()))]
    pub fn launch(launch: GdbLaunch) -> Result<Self> {
        let target = launch.executable.display().to_string();
        let fatal = |reason: String| FatalLaunchError {
            target: target.clone(),
            reason,
        };

        if !launch.executable.is_file() {
            return Err(fatal("executable not found".to_string()).into());
        }
        let mut session = Self::spawn(launch).map_err(|err| fatal(format!("{err:#}")))?;
        session
            .configure_and_run()
            .map_err(|err| fatal(format!("{err:#}")))?;
        info!(exited = session.exited, "program launched");
        Ok(session)
    }

    fn spawn(launch: GdbLaunch) -> Result<Self> {
        let mut child = Command::new(&launch.program)
            .args(["--interpreter=mi2", "--quiet", "--nx"])
            .current_dir(&launch.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", launch.program))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("gdb stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("gdb stdout was not piped"))?;

        let (tx, records) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(MiRecord::parse(&line)).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            launch,
            child,
            stdin,
            records,
            next_token: 0,
            last_stop: None,
            exited: false,
            exit_code: None,
        })
    }

    fn configure_and_run(&mut self) -> Result<()> {
        for setting in ["confirm off", "pagination off", "width 0", "mi-async on"] {
            self.checked(&format!("-gdb-set {setting}"))?;
        }
        let executable = self.launch.executable.display().to_string();
        self.checked(&format!("-file-exec-and-symbols {}", quote(&executable)))?;
        if !self.launch.args.is_empty() {
            let args: Vec<String> = self.launch.args.iter().map(|a| quote(a)).collect();
            self.checked(&format!("-exec-arguments {}", args.join(" ")))?;
        }
        let workdir = self.launch.workdir.display().to_string();
        self.checked(&format!("-environment-cd {}", quote(&workdir)))?;
        if self.launch.pause_at_start {
            let entry = self.launch.entry_function.clone();
            self.checked(&format!("-break-insert {entry}"))?;
        }
        self.run_to_first_stop()
    }

    fn run_to_first_stop(&mut self) -> Result<()> {
        self.exited = false;
        self.exit_code = None;
        self.last_stop = None;
        let reply = self.request("-exec-run")?;
        if reply.class == "error" {
            bail!("{}", error_message(&reply.body));
        }
        if self.last_stop.is_none() {
            bail!(
                "program did not stop within {}s",
                self.launch.command_timeout.as_secs()
            );
        }
        Ok(())
    }

    fn checked(&mut self, command: &str) -> Result<ResultRecord> {
        let reply = self.request(command)?;
        if reply.class == "error" {
            bail!("{command}: {}", error_message(&reply.body));
        }
        Ok(reply)
    }

    /// Send an MI command and wait for its result. A `^running` result also
    /// waits for the next stop, interrupting the program on timeout.
    fn request(&mut self, command: &str) -> Result<ResultRecord> {
        let token = self.send(command)?;
        let timeout = self.launch.command_timeout;
        let deadline = Instant::now() + timeout;
        let mut output = String::new();

        let (class, body) = loop {
            let Some(record) = self.next_record(deadline)? else {
                return Err(SessionError::Timeout {
                    secs: timeout.as_secs(),
                }
                .into());
            };
            if let MiRecord::Result {
                token: Some(t),
                class,
                body,
            } = &record
                && *t == token
            {
                break (class.clone(), body.clone());
            }
            self.observe(&record, &mut output);
        };

        if class == "running" && !self.wait_for_stop(&mut output, timeout)? {
            warn!(command, "program still running after timeout, interrupting");
            self.interrupt(&mut output)?;
            output.push_str(&format!(
                "\n[no stop within {}s; the program was interrupted]\n",
                timeout.as_secs()
            ));
        }
        Ok(ResultRecord {
            class,
            body,
            output,
        })
    }

    fn send(&mut self, command: &str) -> Result<u64> {
        self.next_token += 1;
        let token = self.next_token;
        debug!(token, command, "mi command");
        writeln!(self.stdin, "{token}{command}")
            .and_then(|()| self.stdin.flush())
            .map_err(|err| SessionError::Io(err.to_string()))?;
        Ok(token)
    }

    fn next_record(&mut self, deadline: Instant) -> Result<Option<MiRecord>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.records.recv_timeout(remaining) {
            Ok(record) => Ok(Some(record)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::Disconnected.into()),
        }
    }

    /// Block until `*stopped`. Returns false on timeout.
    fn wait_for_stop(&mut self, output: &mut String, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while let Some(record) = self.next_record(deadline)? {
            if self.observe(&record, output) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn interrupt(&mut self, output: &mut String) -> Result<()> {
        self.send("-exec-interrupt")?;
        if !self.wait_for_stop(output, self.launch.command_timeout)? {
            return Err(SessionError::Timeout {
                secs: self.launch.command_timeout.as_secs(),
            }
            .into());
        }
        Ok(())
    }

    /// Fold one record into the session state. Returns true for `*stopped`.
    fn observe(&mut self, record: &MiRecord, output: &mut String) -> bool {
        match record {
            MiRecord::Console(text) | MiRecord::Target(text) => output.push_str(text),
            MiRecord::Other(text) => {
                output.push_str(text);
                output.push('\n');
            }
            MiRecord::Exec { class, body } if class == "stopped" => {
                self.on_stopped(body);
                return true;
            }
            MiRecord::Notify { class, body } if class == "thread-group-exited" => {
                if let Some(code) = field(body, "exit-code").and_then(|c| parse_exit_code(&c)) {
                    self.exit_code = Some(code);
                }
            }
            _ => {}
        }
        false
    }

    fn on_stopped(&mut self, body: &str) {
        let reason = field(body, "reason");
        debug!(reason = ?reason, "program stopped");
        match reason.as_deref() {
            Some("exited-normally") => {
                self.exited = true;
                self.exit_code = Some(0);
            }
            Some("exited") => {
                self.exited = true;
                self.exit_code = Some(
                    field(body, "exit-code")
                        .and_then(|c| parse_exit_code(&c))
                        .unwrap_or(-1),
                );
            }
            Some("exited-signalled") => {
                self.exited = true;
                self.exit_code = Some(-1);
            }
            _ => {}
        }
        self.last_stop = Some(body.to_string());
    }
}

impl DebuggerSession for GdbSession {
    fn stop_info(&mut self) -> Result<String> {
        if self.exited {
            return Ok(format!(
                "Process exited with status {}",
                self.exit_code.unwrap_or(-1)
            ));
        }
        let mut text = match &self.last_stop {
            Some(body) => describe_stop(body),
            None => "Process is not stopped.".to_string(),
        };
        let backtrace = self.execute_command("bt")?;
        if backtrace.success && !backtrace.output.trim().is_empty() {
            text.push('\n');
            text.push_str(backtrace.output.trim_end());
        }
        Ok(text)
    }

    #[instrument(skip(self))]
    fn execute_command(&mut self, cmd: &str) -> Result<SessionReply> {
        let command = format!("-interpreter-exec console {}", quote(cmd));
        let reply = match self.request(&command) {
            Ok(reply) => reply,
            Err(err) => match err.downcast_ref::<SessionError>() {
                Some(SessionError::Timeout { .. }) => return Ok(SessionReply::failed(err.to_string())),
                _ => return Err(err),
            },
        };
        if reply.class == "error" {
            let mut text = reply.output;
            text.push_str(&error_message(&reply.body));
            return Ok(SessionReply::failed(text));
        }
        Ok(SessionReply::ok(reply.output))
    }

    #[instrument(skip_all)]
    fn restart(&mut self) -> Result<SessionReply> {
        if !self.exited {
            self.request("-interpreter-exec console \"kill\"")?;
        }
        if let Err(err) = self.run_to_first_stop() {
            return Ok(SessionReply::failed(format!("{err:#}")));
        }
        let state = self.stop_info()?;
        Ok(SessionReply::ok(format!("Process restarted. New state: {state}")))
    }

    fn has_exited(&self) -> bool {
        self.exited
    }

    fn exit_status_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl Drop for GdbSession {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "-gdb-exit");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// gdb reports `exit-code` in octal.
fn parse_exit_code(code: &str) -> Option<i32> {
    i32::from_str_radix(code, 8).ok()
}

fn error_message(body: &str) -> String {
    field(body, "msg").unwrap_or_else(|| "debugger reported an error".to_string())
}

/// One-paragraph description of a `*stopped` record.
fn describe_stop(body: &str) -> String {
    let reason = field(body, "reason").unwrap_or_else(|| "unknown".to_string());
    let mut text = format!("* stop reason = {reason}");
    if let Some(signal) = field(body, "signal-name") {
        text.push_str(&format!(", signal {signal}"));
        if let Some(meaning) = field(body, "signal-meaning") {
            text.push_str(&format!(" ({meaning})"));
        }
    }
    if let Some(func) = field(body, "func") {
        text.push_str(&format!("\n  frame: {func}"));
        if let (Some(file), Some(line)) = (field(body, "file"), field(body, "line")) {
            text.push_str(&format!(" at {file}:{line}"));
        } else if let Some(addr) = field(body, "addr") {
            text.push_str(&format!(" at {addr}"));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_octal() {
        assert_eq!(parse_exit_code("01"), Some(1));
        assert_eq!(parse_exit_code("0377"), Some(255));
        assert_eq!(parse_exit_code("9"), None);
    }

    #[test]
    fn describes_signal_stops_with_frame() {
        let body = r#"reason="signal-received",signal-name="SIGSEGV",signal-meaning="Segmentation fault",frame={addr="0x1149",func="main",args=[],file="main.c",fullname="/w/main.c",line="10"}"#;
        assert_eq!(
            describe_stop(body),
            "* stop reason = signal-received, signal SIGSEGV (Segmentation fault)\n  frame: main at main.c:10"
        );
    }

    #[test]
    fn describes_breakpoint_stops_without_source() {
        let body = r#"reason="breakpoint-hit",bkptno="1",frame={addr="0x401000",func="_start",args=[]}"#;
        assert_eq!(
            describe_stop(body),
            "* stop reason = breakpoint-hit\n  frame: _start at 0x401000"
        );
    }

    #[test]
    fn missing_executable_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let launch = GdbLaunch {
            program: "gdb".to_string(),
            executable: temp.path().join("nope"),
            args: Vec::new(),
            workdir: temp.path().to_path_buf(),
            pause_at_start: false,
            entry_function: "main".to_string(),
            command_timeout: Duration::from_secs(1),
        };
        let err = GdbSession::launch(launch).err().expect("fatal");
        assert!(err.downcast_ref::<FatalLaunchError>().is_some());
    }
}
