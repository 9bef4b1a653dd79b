//! AI Pipe Tool
//!
//! Forwards a JSON payload to a dataflow endpoint. With no endpoint
//! configured it answers with a fixed mock result.

use agent_core::tool::{ParameterSchema, Tool, ToolDeclaration};
use agent_core::Result as CoreResult;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::PipeConfig;
use crate::error::{Result, ToolError};

pub const MOCK_RESULT: &str = "Successfully called AI Pipe. Result: [mock_data]";

/// `aiPipe(data)`
pub struct AiPipeTool {
    client: reqwest::Client,
    config: PipeConfig,
}

impl AiPipeTool {
    pub const fn new(client: reqwest::Client, config: PipeConfig) -> Self {
        Self { client, config }
    }

    async fn call(&self, endpoint: &str, data: &Value) -> Result<String> {
        let mut request = self.client.post(endpoint).json(data);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::PipeStatus(status.as_u16()));
        }

        let result: Value = response.json().await?;
        Ok(serde_json::to_string(&result)?)
    }
}

#[async_trait]
impl Tool for AiPipeTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: "aiPipe".into(),
            description: "Use the AI Pipe for flexible dataflows or complex tasks.".into(),
            parameters: vec![ParameterSchema::new(
                "data",
                "object",
                "The data object to send to the pipe.",
                true,
            )],
        }
    }

    async fn invoke(&self, argument: Value) -> CoreResult<String> {
        let Some(endpoint) = &self.config.endpoint else {
            tracing::debug!(payload = %argument, "AI Pipe not configured, returning mock result");
            return Ok(MOCK_RESULT.into());
        };

        Ok(match self.call(endpoint, &argument).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "AI Pipe call failed");
                format!("Error calling AI Pipe: {e}")
            }
        })
    }
}
