//! # agent-tools
//!
//! The built-in tools the model may call mid-conversation.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  googleSearch       GET custom search API, top 3 hits as JSON  │
//! │  aiPipe             POST payload to a dataflow endpoint        │
//! │  executeJavascript  run code in a limited interpreter process  │
//! │  createChart        validate config, hand it to a ChartSink    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Search, pipe and code failures come back as result text so the model can
//! see them. A rejected chart config is a tool error.

use std::sync::Arc;

use agent_core::ToolRegistry;
use serde_json::Value;

pub mod chart;
pub mod config;
pub mod error;
pub mod javascript;
pub mod pipe;
pub mod search;

pub use chart::{ChartConfig, ChartSink, ChartTool};
pub use config::{PipeConfig, SandboxConfig, SearchConfig, ToolsConfig};
pub use error::{Result, ToolError};
pub use javascript::JavaScriptTool;
pub use pipe::AiPipeTool;
pub use search::GoogleSearchTool;

/// Registry with all built-in tools, sharing one HTTP client
pub fn default_registry(config: &ToolsConfig, charts: Arc<dyn ChartSink>) -> ToolRegistry {
    let client = reqwest::Client::new();
    let mut registry = ToolRegistry::new();

    registry.register(GoogleSearchTool::new(client.clone(), config.search.clone()));
    registry.register(AiPipeTool::new(client, config.pipe.clone()));
    registry.register(JavaScriptTool::new(config.sandbox.clone()));
    registry.register(ChartTool::new(charts));

    tracing::debug!(tools = ?registry.names(), "Registered built-in tools");
    registry
}

/// Text form of a tool argument; strings are taken as-is
pub(crate) fn argument_text(argument: &Value) -> String {
    match argument {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with `status` and a JSON `body`; the handle yields
    /// the raw request text.
    pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&raw) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (format!("http://{addr}/"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let line = line.to_lowercase();
                line.strip_prefix("content-length:")
                    .and_then(|v| v.trim().parse::<usize>().ok())
            })
            .unwrap_or(0);
        raw.len() >= head_end + 4 + length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoCharts;

    impl ChartSink for NoCharts {
        fn render_chart(&self, _config: Value) {}
    }

    #[test]
    fn test_default_registry() {
        let registry = default_registry(&ToolsConfig::default(), Arc::new(NoCharts));
        assert_eq!(
            registry.names(),
            vec!["googleSearch", "aiPipe", "executeJavascript", "createChart"]
        );
        assert!(registry.is_quiet("createChart"));
        assert!(!registry.is_quiet("googleSearch"));
    }

    #[test]
    fn test_argument_text() {
        assert_eq!(argument_text(&json!("q")), "q");
        assert_eq!(argument_text(&json!(42)), "42");
        assert_eq!(argument_text(&Value::Null), "");
    }

    #[tokio::test]
    async fn test_registry_dispatch_through_core() {
        let registry = default_registry(&ToolsConfig::default(), Arc::new(NoCharts));
        let call = agent_core::ToolCallRequest::new("p1", "aiPipe", r#"{"data":{"x":1}}"#);
        let result = registry.dispatch(&call).await;
        assert!(result.success);
        assert_eq!(result.output, pipe::MOCK_RESULT);

        let bad_chart = agent_core::ToolCallRequest::new("c1", "createChart", r#"{"chartConfig":{"type":"pie"}}"#);
        let result = registry.dispatch(&bad_chart).await;
        assert!(!result.success);
        assert!(result.output.starts_with("Error in tool createChart: Tool execution error: Invalid chart config"));
    }
}
