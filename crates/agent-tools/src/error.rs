//! Error Types for Built-in Tools

use std::time::Duration;

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Google Search API failed with status: {0}")]
    SearchStatus(u16),

    #[error("AI Pipe API failed with status: {0}")]
    PipeStatus(u16),

    /// Error raised by the executed code itself
    #[error("{name} - {message}")]
    Execution { name: String, message: String },

    #[error("Execution exceeded {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Output exceeded {0} bytes")]
    OutputLimit(usize),

    #[error("Sandbox failure: {0}")]
    Sandbox(String),

    #[error("Invalid chart config: {0}")]
    InvalidChart(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Error class name reported for failed code execution
    pub fn execution_name(&self) -> &str {
        match self {
            Self::Execution { name, .. } => name,
            Self::Timeout(_) => "TimeoutError",
            Self::OutputLimit(_) => "RangeError",
            _ => "SandboxError",
        }
    }

    /// Message half of an execution error
    pub fn execution_message(&self) -> String {
        match self {
            Self::Execution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Config(msg) => Self::Config(msg),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ToolError::SearchStatus(403).to_string(),
            "Google Search API failed with status: 403"
        );
        let err = ToolError::Execution {
            name: "ReferenceError".into(),
            message: "x is not defined".into(),
        };
        assert_eq!(err.to_string(), "ReferenceError - x is not defined");
        assert_eq!(err.execution_name(), "ReferenceError");
        assert_eq!(ToolError::Timeout(Duration::from_secs(5)).to_string(), "Execution exceeded 5000ms");
    }

    #[test]
    fn test_into_agent_error() {
        let err: AgentError = ToolError::InvalidChart("missing data".into()).into();
        assert!(matches!(err, AgentError::ToolExecution(msg) if msg.contains("missing data")));
    }
}
