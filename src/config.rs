use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::brain::DEFAULT_API_BASE;
use crate::error::{AgentError, Result};
use crate::subagent::SubAgentSettings;
use crate::types::{MAX_BROWSER_STEPS, MAX_TOOL_ROUNDS};

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_COMPILE_URL: &str = "https://compile.useoctree.com";
const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub chat_model: String,
    pub browser_model: String,
    pub max_tool_rounds: usize,
    pub max_browser_steps: usize,
    /// Wall-clock limit for one job application.
    pub browser_timeout: Duration,
    pub compile_url: String,
    pub compile_jwt: Option<String>,
    pub resume_path: PathBuf,
    pub profile_path: PathBuf,
    /// Where conversation history is persisted; in-memory only when unset.
    pub history_path: Option<PathBuf>,
    pub bind: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let anthropic_api_key = get("ANTHROPIC_API_KEY")
            .ok_or_else(|| AgentError::Config("ANTHROPIC_API_KEY not set in environment".into()))?;

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jobpilot");

        Ok(Self {
            anthropic_api_key,
            anthropic_base_url: get("ANTHROPIC_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            chat_model: get("JOBPILOT_CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            browser_model: get("JOBPILOT_BROWSER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            max_tool_rounds: parse(&get, "JOBPILOT_MAX_TOOL_ROUNDS", MAX_TOOL_ROUNDS)?,
            max_browser_steps: parse(&get, "JOBPILOT_MAX_BROWSER_STEPS", MAX_BROWSER_STEPS)?,
            browser_timeout: Duration::from_secs(parse(
                &get,
                "JOBPILOT_BROWSER_TIMEOUT_SECS",
                300u64,
            )?),
            compile_url: get("COMPILE_URL").unwrap_or_else(|| DEFAULT_COMPILE_URL.into()),
            compile_jwt: get("COMPILE_JWT_TOKEN"),
            resume_path: get("JOBPILOT_RESUME_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("resume.pdf")),
            profile_path: get("JOBPILOT_PROFILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("profile.md")),
            history_path: get("JOBPILOT_HISTORY_PATH").map(PathBuf::from),
            bind: get("JOBPILOT_BIND").unwrap_or_else(|| DEFAULT_BIND.into()),
        })
    }

    pub fn browser_settings(&self) -> SubAgentSettings {
        SubAgentSettings {
            model: self.browser_model.clone(),
            max_iterations: self.max_browser_steps,
            run_timeout: self.browser_timeout,
            idle_timeout: self.browser_timeout,
            ..Default::default()
        }
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}
