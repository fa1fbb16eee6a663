//! Driver configuration stored under `.debugloop/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;

/// Driver configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that work
/// for a small C program built with `make`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Upper bound on decision turns per run.
    pub max_turns: u32,

    pub build: BuildConfig,
    pub patch: PatchConfig,
    pub source: SourceConfig,
    pub debugger: DebuggerConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Build command run in the working directory (e.g. `["make"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate build stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Build once before the first turn; a failure aborts the run.
    pub on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PatchConfig {
    /// Unchanged lines shown around each diff hunk.
    pub context_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    /// Lines shown on each side of the requested line by `get_source`.
    pub context_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DebuggerConfig {
    pub program: String,
    /// Stop at `entry_function` instead of running straight to the crash.
    pub pause_at_start: bool,
    pub entry_function: String,
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub stream: bool,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_turns: 40,
            build: BuildConfig::default(),
            patch: PatchConfig::default(),
            source: SourceConfig::default(),
            debugger: DebuggerConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["make".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 64_000,
            on_start: false,
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { context_lines: 10 }
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            program: "gdb".to_string(),
            pause_at_start: false,
            entry_function: "main".to_string(),
            command_timeout_secs: 30,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            stream: true,
            max_tokens: 4096,
            timeout_secs: 5 * 60,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(anyhow!("build.command must be a non-empty array"));
        }
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        if self.build.output_limit_bytes == 0 {
            return Err(anyhow!("build.output_limit_bytes must be > 0"));
        }
        if self.debugger.program.trim().is_empty() {
            return Err(anyhow!("debugger.program must not be empty"));
        }
        if self.debugger.pause_at_start && self.debugger.entry_function.trim().is_empty() {
            return Err(anyhow!(
                "debugger.entry_function must be set when debugger.pause_at_start is true"
            ));
        }
        if self.debugger.command_timeout_secs == 0 {
            return Err(anyhow!("debugger.command_timeout_secs must be > 0"));
        }
        if self.service.base_url.trim().is_empty() {
            return Err(anyhow!("service.base_url must not be empty"));
        }
        if self.service.model.trim().is_empty() {
            return Err(anyhow!("service.model must not be empty"));
        }
        if self.service.max_tokens == 0 {
            return Err(anyhow!("service.max_tokens must be > 0"));
        }
        if self.service.timeout_secs == 0 {
            return Err(anyhow!("service.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DriverConfig::default()`.
pub fn load_config(path: &Path) -> Result<DriverConfig> {
    if !path.exists() {
        let cfg = DriverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DriverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DriverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, DriverConfig::default());
        assert_eq!(cfg.patch.context_lines, 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = DriverConfig::default();
        cfg.build.command = vec!["cc".into(), "-g".into(), "main.c".into()];
        cfg.debugger.pause_at_start = true;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_turns = 5\n[build]\ncommand = [\"./build.sh\"]\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_turns, 5);
        assert_eq!(cfg.build.command, vec!["./build.sh".to_string()]);
        assert_eq!(cfg.build.timeout_secs, BuildConfig::default().timeout_secs);
        assert_eq!(cfg.service, ServiceConfig::default());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut cfg = DriverConfig::default();
        cfg.build.timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = DriverConfig::default();
        cfg.build.command = vec![" ".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = DriverConfig::default();
        cfg.max_turns = 0;
        assert!(cfg.validate().is_err());
    }
}
