//! Error Types

use thiserror::Error;

use crate::provider::ProviderProfile;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Non-2xx response or malformed payload from an LLM provider
    #[error("{} API Error: {message}", .provider.as_str().to_uppercase())]
    Provider {
        provider: ProviderProfile,
        message: String,
    },

    /// Network failure before a response was received
    #[error("Transport error ({provider}): {message}")]
    Transport {
        provider: ProviderProfile,
        message: String,
    },

    /// Submit attempted with no model selected
    #[error("No model selected")]
    NoModelSelected,

    /// Submit attempted with no usable API key
    #[error("Missing API key for {0}")]
    MissingApiKey(ProviderProfile),

    /// Attachment offered to a provider that cannot take it
    #[error("Attachments are not supported for {0}")]
    AttachmentUnsupported(ProviderProfile),

    /// Attachment payload could not be decoded
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Tool arguments did not parse to a JSON object
    #[error("Invalid tool arguments: {0}")]
    ToolArguments(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool-calling chain exceeded the configured bound
    #[error("Too many tool iterations (limit {0})")]
    MaxToolIterations(usize),

    /// Persistent store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Whether the error came from the provider round trip (including transport)
    pub const fn is_provider_error(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Transport { .. })
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        let text = self.to_string();
        let lowered = text.to_lowercase();

        match self {
            Self::NoModelSelected => "Please select an LLM model first.".into(),
            Self::MissingApiKey(provider) => {
                format!("Please enter your {} API key first.", provider.display_name())
            }
            Self::AttachmentUnsupported(_) => {
                "Image upload is only supported for Google Gemini models.".into()
            }
            Self::MaxToolIterations(limit) => format!(
                "The model kept requesting tools ({limit} rounds). Please try a simpler query."
            ),
            Self::Transport { provider: ProviderProfile::Anthropic, .. } => {
                "Could not connect to Anthropic. This often happens if the API key is missing or incorrect.".into()
            }
            _ if lowered.contains("incorrect api key") => {
                "The API key you provided is incorrect. Please check it and try again.".into()
            }
            _ if lowered.contains("quota") || lowered.contains("rate limit") => {
                "You have exceeded your API quota or rate limit. Please check your account status.".into()
            }
            _ => format!("An unexpected error occurred: {text}"),
        }
    }
}
