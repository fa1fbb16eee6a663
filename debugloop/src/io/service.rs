//! Decision service abstraction.
//!
//! The [`DecisionService`] trait decouples the loop from the remote model.
//! [`ChatCompletionsService`] talks to an OpenAI-compatible
//! `/chat/completions` endpoint; tests use scripted services that return
//! predetermined fragments.

use std::env;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::core::types::Turn;
use crate::io::config::ServiceConfig;

/// Everything the service sees for one decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub turns: &'a [Turn],
    /// Tool menu in chat-completions form.
    pub tools: &'a Value,
}

/// Stream of partial decision objects, in arrival order.
pub type Fragments<'a> = Box<dyn Iterator<Item = Result<Value>> + 'a>;

pub trait DecisionService {
    /// Ask for the next decision. A non-streaming backend yields one fragment.
    fn fragments<'a>(&'a self, request: &DecisionRequest<'_>) -> Result<Fragments<'a>>;
}

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Debug)]
pub struct ChatCompletionsService {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    stream: bool,
}

impl ChatCompletionsService {
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let api_key = env::var(&cfg.api_key_env)
            .with_context(|| format!("read API key from ${}", cfg.api_key_env))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            stream: cfg.stream,
        })
    }

    fn body(&self, request: &DecisionRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "messages": request.turns,
            "tools": request.tools,
            "tool_choice": "auto",
            "max_tokens": self.max_tokens,
            "stream": self.stream,
        })
    }
}

impl DecisionService for ChatCompletionsService {
    #[instrument(skip_all, fields(model = %self.model, turns = request.turns.len(), stream = self.stream))]
    fn fragments<'a>(&'a self, request: &DecisionRequest<'_>) -> Result<Fragments<'a>> {
        info!("requesting decision");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("decision service returned {status}: {}", body.trim());
        }

        if self.stream {
            return Ok(Box::new(SseFragments::new(response)));
        }
        let payload: Value = response.json().context("parse chat completion")?;
        let message = payload
            .pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| anyhow!("chat completion has no choices[0].message"))?;
        Ok(Box::new(std::iter::once(Ok(message))))
    }
}

/// One classified server-sent-event line.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// A `choices[0].delta` fragment.
    Fragment(Value),
    /// `data: [DONE]`
    Done,
    /// Blank lines, comments, non-data fields, events without a delta.
    Skip,
}

/// Classify one line of a chat-completions event stream.
pub fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    let event: Value = serde_json::from_str(data).context("parse stream event")?;
    if let Some(err) = event.get("error") {
        bail!("decision service stream error: {err}");
    }
    Ok(match event.pointer("/choices/0/delta") {
        Some(delta) => SseLine::Fragment(delta.clone()),
        None => SseLine::Skip,
    })
}

struct SseFragments {
    lines: std::io::Lines<BufReader<Response>>,
    done: bool,
}

impl SseFragments {
    fn new(response: Response) -> Self {
        Self {
            lines: BufReader::new(response).lines(),
            done: false,
        }
    }
}

impl Iterator for SseFragments {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.done = true;
                    return Some(Err::<Value, _>(err).context("read event stream"));
                }
            };
            match parse_sse_line(&line) {
                Ok(SseLine::Fragment(delta)) => return Some(Ok(delta)),
                Ok(SseLine::Done) => {
                    debug!("event stream finished");
                    self.done = true;
                }
                Ok(SseLine::Skip) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
