//! Runtime Configuration
//!
//! Environment-driven settings shared by every host.

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::reasoning::DEFAULT_MAX_TOOL_ITERATIONS;
use serde::Serialize;

/// Placeholder shipped in sample configs; treated as "no key"
pub const API_KEY_PLACEHOLDER: &str = "YOUR_OPENAI_API_KEY_HERE";

/// Runtime configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    /// Fallback key used when the user has not entered one
    #[serde(skip)]
    pub default_api_key: Option<String>,

    /// Bound on model requests per submit
    pub max_tool_iterations: Option<usize>,

    /// Client timeout; `None` waits indefinitely
    pub http_timeout: Option<Duration>,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_api_key = lookup("LLM_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != API_KEY_PLACEHOLDER);

        let max_tool_iterations = match lookup("MAX_TOOL_ITERATIONS") {
            Some(raw) => {
                let max: usize = parse_var("MAX_TOOL_ITERATIONS", &raw)?;
                if max == 0 {
                    return Err(AgentError::Config("MAX_TOOL_ITERATIONS must be at least 1".into()));
                }
                Some(max)
            }
            None => None,
        };

        let http_timeout = lookup("HTTP_TIMEOUT_SECS")
            .map(|raw| parse_var::<u64>("HTTP_TIMEOUT_SECS", &raw))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            default_api_key,
            max_tool_iterations,
            http_timeout,
        })
    }

    pub fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations.unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS)
    }

    /// The user's key when present, otherwise the configured default
    pub fn resolve_api_key(&self, user_key: Option<&str>) -> Option<String> {
        user_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_api_key.clone())
    }
}

/// Parse one variable, naming it in the error
pub fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AgentError::Config(format!("{name}: {e}")))
}
