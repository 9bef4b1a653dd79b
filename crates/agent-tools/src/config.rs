//! Tool Configuration
//!
//! Backend endpoints, credentials and sandbox limits, read from the
//! environment once at startup.

use std::time::Duration;

use crate::error::{Result, ToolError};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Custom Search settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub cx_id: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SEARCH_ENDPOINT.into(),
            api_key: String::new(),
            cx_id: String::new(),
        }
    }
}

/// AI Pipe settings; without an endpoint the tool answers with mock data
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipeConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// Limits for the JavaScript interpreter process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Interpreter executable
    pub program: String,

    /// Wall-clock limit
    pub timeout: Duration,

    /// Heap limit passed as `--max-old-space-size`
    pub max_heap_mb: u32,

    /// Captured stdout cap
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: "node".into(),
            timeout: Duration::from_secs(5),
            max_heap_mb: 64,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// All built-in tool settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolsConfig {
    pub search: SearchConfig,
    pub pipe: PipeConfig,
    pub sandbox: SandboxConfig,
}

impl ToolsConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = SandboxConfig::default();

        let search = SearchConfig {
            endpoint: non_empty("GOOGLE_SEARCH_ENDPOINT").unwrap_or_else(|| DEFAULT_SEARCH_ENDPOINT.into()),
            api_key: non_empty("GOOGLE_API_KEY").unwrap_or_default(),
            cx_id: non_empty("GOOGLE_CX_ID").unwrap_or_default(),
        };

        let pipe = PipeConfig {
            endpoint: non_empty("AI_PIPE_ENDPOINT"),
            api_key: non_empty("AI_PIPE_API_KEY"),
        };

        let sandbox = SandboxConfig {
            program: non_empty("JS_SANDBOX_PROGRAM").unwrap_or(defaults.program),
            timeout: non_empty("JS_SANDBOX_TIMEOUT_SECS")
                .map(|v| parse::<u64>("JS_SANDBOX_TIMEOUT_SECS", &v))
                .transpose()?
                .map_or(defaults.timeout, Duration::from_secs),
            max_heap_mb: non_empty("JS_SANDBOX_MAX_HEAP_MB")
                .map(|v| parse("JS_SANDBOX_MAX_HEAP_MB", &v))
                .transpose()?
                .unwrap_or(defaults.max_heap_mb),
            max_output_bytes: non_empty("JS_SANDBOX_MAX_OUTPUT_BYTES")
                .map(|v| parse("JS_SANDBOX_MAX_OUTPUT_BYTES", &v))
                .transpose()?
                .unwrap_or(defaults.max_output_bytes),
        };

        if search.api_key.is_empty() || search.cx_id.is_empty() {
            tracing::warn!("GOOGLE_API_KEY or GOOGLE_CX_ID not set; googleSearch will fail");
        }

        Ok(Self { search, pipe, sandbox })
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ToolError::Config(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<ToolsConfig> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        ToolsConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = from(&[]).unwrap();
        assert_eq!(config, ToolsConfig::default());
        assert_eq!(config.sandbox.timeout, Duration::from_secs(5));
        assert!(config.pipe.endpoint.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_CX_ID", "cx"),
            ("AI_PIPE_ENDPOINT", "https://pipe.example/run"),
            ("JS_SANDBOX_PROGRAM", "/usr/local/bin/node"),
            ("JS_SANDBOX_TIMEOUT_SECS", "2"),
            ("JS_SANDBOX_MAX_HEAP_MB", "32"),
            ("JS_SANDBOX_MAX_OUTPUT_BYTES", "1024"),
        ])
        .unwrap();

        assert_eq!(config.search.api_key, "g-key");
        assert_eq!(config.pipe.endpoint.as_deref(), Some("https://pipe.example/run"));
        assert_eq!(config.sandbox.program, "/usr/local/bin/node");
        assert_eq!(config.sandbox.timeout, Duration::from_secs(2));
        assert_eq!(config.sandbox.max_heap_mb, 32);
        assert_eq!(config.sandbox.max_output_bytes, 1024);
    }

    #[test]
    fn test_invalid_number() {
        let err = from(&[("JS_SANDBOX_MAX_HEAP_MB", "lots")]).unwrap_err();
        assert!(err.to_string().contains("JS_SANDBOX_MAX_HEAP_MB"));
    }
}
