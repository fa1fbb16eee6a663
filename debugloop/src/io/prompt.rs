//! Prompt text sent to the decision service.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Sent as a user turn before every decision after the first.
pub const NEXT_INSTRUCTION: &str =
    "Decide what to do next. Call one or more of the available functions.";

/// Sent after a turn that called no function.
pub const MALFORMED_NOTICE: &str =
    "That response did not call a valid function. Call one of the available functions.";

/// Values rendered into the system prompt.
#[derive(Debug, Clone)]
pub struct SystemPromptInputs<'a> {
    pub executable: &'a str,
    pub args: &'a [String],
    pub workdir: &'a str,
    pub build_command: &'a [String],
    pub max_turns: u32,
}

pub fn render_system_prompt(input: &SystemPromptInputs<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("system", SYSTEM_TEMPLATE)
        .context("load system prompt template")?;
    let template = env.get_template("system")?;
    let rendered = template
        .render(context! {
            executable => input.executable,
            args => input.args,
            workdir => input.workdir,
            build_command => input.build_command.join(" "),
            max_turns => input.max_turns,
        })
        .context("render system prompt")?;
    debug!(bytes = rendered.len(), "system prompt rendered");
    Ok(rendered)
}

/// First user turn: where the program stopped.
pub fn initial_user_message(stop_info: &str) -> String {
    format!("The program stopped:\n{}", stop_info.trim_end())
}
